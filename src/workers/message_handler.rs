//! # MessageHandler worker
//!
//! Dispatches each reassembled [`Message`](crate::message::Message) popped
//! from RMQ: inbound requests (`owner=1`) go to the per-type handler
//! registry; responses (`owner=0`) are correlated against the outbound
//! TagTable and handed off to ACQ for the Completer to finish.

use crate::action::Action;
use crate::core::{Core, POLL_INTERVAL};
use crate::error::McError;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

pub async fn run(core: Arc<Core>, wait: bool, shutdown: ShutdownSignal) {
    let mut rx = shutdown.subscribe();
    loop {
        if *rx.borrow() {
            break;
        }
        let msg = tokio::select! {
            _ = rx.changed() => break,
            res = core.rmq.pop(wait) => res,
        };
        let msg = match msg {
            Ok(m) => m,
            Err(McError::Empty) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(_) => break,
        };

        if msg.owner {
            let action = tokio::select! {
                _ = rx.changed() => { core.msg_pool.release(msg); break; }
                res = core.action_pool.acquire(wait) => res,
            };
            let mut action: Box<Action> = match action {
                Ok(a) => a,
                Err(McError::Empty) => {
                    // No room to track this request right now; the message
                    // itself still has to go somewhere, so return it and
                    // retry on the next pop rather than block indefinitely.
                    core.msg_pool.release(msg);
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                Err(_) => {
                    core.msg_pool.release(msg);
                    break;
                }
            };

            action.created = msg.ts;
            let msg_type = msg.msg_type;
            action.req = Some(msg);

            let handler = core.handlers.lock().await.get(msg_type);
            match handler {
                Some(h) => h.handle(&core, action).await,
                None => {
                    // Per the handler contract (§6): no handler registered
                    // means the request is discarded. Pool conservation
                    // (Testable Property 7) holds regardless, so the action
                    // and the req Message it owns are returned to their
                    // pools exactly as any other drop path does.
                    warn!(msg_type, "message_handler: no handler registered, discarding request");
                    if let Some(req) = action.req.take() {
                        core.msg_pool.release(req);
                    }
                    action.reset();
                    core.action_pool.release(action);
                }
            }
        } else {
            let tag = msg.tag;
            let existing = {
                let mut tags = core.tags.lock().unwrap();
                let action = tags.table.take(tag);
                if action.is_some() {
                    tags.reserved[tag as usize] = false;
                }
                action
            };
            match existing {
                None => {
                    trace!(tag, "message_handler: response with no outstanding tag, dropping");
                    core.msg_pool.release(msg);
                }
                Some(mut action) => {
                    action.rsp = Some(msg);
                    action.completed = Some(Instant::now());

                    if action.on_completed.is_some() {
                        if core.acq.push(action).is_err() {
                            shutdown.trigger();
                            break;
                        }
                        continue;
                    }

                    // No per-action callback: fall back to the registered
                    // handler for this message type, matching threads.c's
                    // `else self->m->handlers[mm->type](self->m, ma)`.
                    let msg_type = action.req.as_ref().map(|r| r.msg_type);
                    let handler = match msg_type {
                        Some(t) => core.handlers.lock().await.get(t),
                        None => None,
                    };
                    match handler {
                        Some(h) => h.handle(&core, action).await,
                        None => {
                            warn!(
                                msg_type = msg_type.unwrap_or(0),
                                "message_handler: no handler registered for completed response, discarding"
                            );
                            if let Some(req) = action.req.take() {
                                core.msg_pool.release(req);
                            }
                            if let Some(rsp) = action.rsp.take() {
                                core.msg_pool.release(rsp);
                            }
                            action.reset();
                            core.action_pool.release(action);
                        }
                    }
                }
            }
        }
    }
}
