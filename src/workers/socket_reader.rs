//! # SocketReader worker
//!
//! Acquires a packet wrapper from the pool, reads exactly one 68-byte
//! packet from the socket into it, and pushes it to RPQ. A short read (the
//! peer closing the connection, or any I/O error) triggers cooperative
//! shutdown, matching the original's `recv() <= 0` handling in
//! `mctp_socket_reader`.

use crate::core::Core;
use crate::packet::{Packet, PKT_LEN};
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, trace};

pub async fn run(core: Arc<Core>, mut reader: OwnedReadHalf, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();

    loop {
        if *rx.borrow() {
            break;
        }

        let wrapper = tokio::select! {
            _ = rx.changed() => break,
            res = core.pkt_pool.acquire(wait) => res,
        };
        let mut wrapper = match wrapper {
            Ok(w) => w,
            Err(crate::error::McError::Empty) => {
                tokio::time::sleep(crate::core::POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        let mut buf = [0u8; PKT_LEN];
        let recv = tokio::select! {
            _ = rx.changed() => {
                core.pkt_pool.release(wrapper);
                break;
            }
            res = reader.read_exact(&mut buf) => res,
        };

        match recv {
            Ok(_) => {
                wrapper.packet = Packet::from_bytes(buf);
                wrapper.received_at = Instant::now();
                if core.rpq.push(wrapper).is_err() {
                    trace!("socket_reader: RPQ closed, stopping");
                    shutdown.trigger();
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "socket_reader: read failed, requesting stop");
                core.pkt_pool.release(wrapper);
                shutdown.trigger();
                break;
            }
        }
    }
}
