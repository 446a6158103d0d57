//! # Completer worker
//!
//! Pops from ACQ, stamps `completed`, and dispatches to whichever callback
//! applies (`on_failed` for `completion_code != 0`, `on_completed`
//! otherwise) before returning the action's resources with
//! [`Core::recycle`] — matching the original's `mctp_completion_thread`,
//! with one deliberate departure: the original only calls `mctp_retire`
//! when no callback is registered, leaving retirement to the callback
//! itself otherwise (callbacks there hold the same raw pointer and are
//! free to call it). This port's [`crate::action::ActionCallback`] takes
//! `&Action`, not ownership, so it cannot recycle the action itself —
//! recycling unconditionally after the callback runs is what keeps the
//! pools from draining under a registered callback. Either way, the tag
//! reservation is released and a waiting synchronous `submit` caller (if
//! any) is woken via `notify`.

use crate::core::{Core, POLL_INTERVAL};
use crate::error::McError;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Instant;

pub async fn run(core: Arc<Core>, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();

    loop {
        if *rx.borrow() {
            break;
        }

        let action = tokio::select! {
            _ = rx.changed() => break,
            res = core.acq.pop(wait) => res,
        };
        let mut action = match action {
            Ok(a) => a,
            Err(McError::Empty) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        action.completed = Some(Instant::now());
        core.retire_tag(&action);

        let callback = if action.completion_code != 0 {
            action.on_failed.clone()
        } else {
            action.on_completed.clone()
        };

        if let Some(cb) = callback {
            cb(&action);
        }
        if let Some(notify) = action.notify.clone() {
            notify.add_permits(1);
        }
        core.recycle(action);
    }
}
