//! # PacketWriter worker
//!
//! Pops an [`Action`] from TMQ, fragments whichever of `rsp`/`req` it is
//! carrying (a response if one was produced, otherwise the outbound request
//! itself) into wire packets, and pushes the action on to TPQ once every
//! packet has a pool-allocated [`PacketWrapper`] to live in.
//!
//! `next_seq` is a single counter owned by this worker and threaded across
//! every action it ever fragments — not reset per action, not per tag —
//! matching the original's `struct packet_writer.pkt_seq`.

use crate::action::Action;
use crate::codec::fragment;
use crate::core::{Core, POLL_INTERVAL};
use crate::error::McError;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

pub async fn run(core: Arc<Core>, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();
    let mut next_seq: u8 = 0;

    loop {
        if *rx.borrow() {
            break;
        }

        let action = tokio::select! {
            _ = rx.changed() => break,
            res = core.tmq.pop(wait) => res,
        };
        let mut action: Box<Action> = match action {
            Ok(a) => a,
            Err(McError::Empty) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        let packets = {
            let msg = action
                .rsp
                .as_ref()
                .or(action.req.as_ref())
                .expect("action reaching PacketWriter carries a req or a rsp");
            fragment(msg, &mut next_seq)
        };

        let mut wrappers = Vec::with_capacity(packets.len());
        let mut exhausted = false;
        for packet in packets {
            let acquired = tokio::select! {
                _ = rx.changed() => { exhausted = true; break; }
                res = core.pkt_pool.acquire(wait) => res,
            };
            match acquired {
                Ok(mut wrapper) => {
                    wrapper.packet = packet;
                    wrapper.received_at = Instant::now();
                    wrappers.push(wrapper);
                }
                Err(McError::Empty) => {
                    // wait = false and the pool is momentarily dry: give up
                    // on this action rather than spin forever mid-fragment.
                    exhausted = true;
                    break;
                }
                Err(_) => {
                    exhausted = true;
                    break;
                }
            }
        }

        if exhausted {
            warn!("packet_writer: packet pool exhausted, discarding action");
            action.pw = wrappers;
            core.retire_tag(&action);
            core.recycle(action);
            if *rx.borrow() {
                break;
            }
            continue;
        }

        action.pw = wrappers;
        if core.tpq.push(action).is_err() {
            trace!("packet_writer: TPQ closed, stopping");
            shutdown.trigger();
            break;
        }
    }
}
