//! # SocketWriter worker
//!
//! Pops an action from TPQ and writes every packet in `action.pw` to the
//! socket in order. Every wrapper is drained back to the packet pool once
//! sent (or once sending has failed) — the action no longer needs them
//! either way.
//!
//! On success: if the action already carries a response (`rsp.is_some()`,
//! i.e. this was a locally generated reply), it is done and goes to ACQ for
//! retirement. Otherwise it is an outbound request awaiting a reply, so it
//! is handed back to the outbound TagTable to wait — Submitter installed
//! the tag reservation at admission time, but the table slot itself stays
//! empty until the request actually reaches the wire (see
//! `core::TagState`).
//!
//! On failure: `completion_code` is set and the action goes straight to
//! ACQ, matching the original's `mctp_socket_writer` error path.

use crate::action::Action;
use crate::core::Core;
use crate::error::McError;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, trace};

pub async fn run(core: Arc<Core>, mut writer: OwnedWriteHalf, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();

    loop {
        if *rx.borrow() {
            break;
        }

        let action = tokio::select! {
            _ = rx.changed() => break,
            res = core.tpq.pop(wait) => res,
        };
        let mut action: Box<Action> = match action {
            Ok(a) => a,
            Err(McError::Empty) => {
                tokio::time::sleep(crate::core::POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        let mut send_failed = false;
        for wrapper in &action.pw {
            let bytes = wrapper.packet.to_bytes();
            let sent = tokio::select! {
                _ = rx.changed() => { send_failed = true; break; }
                res = writer.write_all(&bytes) => res,
            };
            if let Err(e) = sent {
                debug!(error = %e, "socket_writer: write failed");
                send_failed = true;
                break;
            }
        }

        for wrapper in action.pw.drain(..) {
            core.pkt_pool.release(wrapper);
        }

        if send_failed {
            action.completion_code = 1;
            if core.acq.push(action).is_err() {
                trace!("socket_writer: ACQ closed, stopping");
                shutdown.trigger();
                break;
            }
            shutdown.trigger();
            break;
        }

        if action.rsp.is_some() {
            if core.acq.push(action).is_err() {
                trace!("socket_writer: ACQ closed, stopping");
                shutdown.trigger();
                break;
            }
        } else {
            let tag = action
                .req
                .as_ref()
                .expect("an outbound action with no rsp always carries a req")
                .tag;
            let mut tags = core.tags.lock().unwrap();
            tags.table.install(tag, action);
        }
    }
}
