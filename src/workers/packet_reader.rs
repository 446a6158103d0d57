//! # PacketReader worker
//!
//! Pops packets from RPQ and feeds them through a [`Reassembler`], pushing
//! each completed [`Message`](crate::message::Message) to RMQ. The packet
//! wrapper is always returned to the packet pool once its payload has been
//! copied into (or discarded from) the reassembly state, regardless of
//! whether the packet completed a message, continued one, or was dropped.

use crate::codec::Reassembler;
use crate::core::{Core, POLL_INTERVAL};
use crate::error::McError;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use tracing::trace;

pub async fn run(core: Arc<Core>, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();
    let mut reassembler = Reassembler::new();

    loop {
        if *rx.borrow() {
            break;
        }

        let wrapper = tokio::select! {
            _ = rx.changed() => break,
            res = core.rpq.pop(wait) => res,
        };
        let wrapper = match wrapper {
            Ok(w) => w,
            Err(McError::Empty) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        let completed = reassembler.accept(&wrapper.packet, wrapper.received_at, &core.msg_pool);
        core.pkt_pool.release(wrapper);

        if let Some(msg) = completed {
            if core.rmq.push(msg).is_err() {
                trace!("packet_reader: RMQ closed, stopping");
                shutdown.trigger();
                break;
            }
        }
    }
}
