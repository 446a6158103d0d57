//! # Handler registry
//!
//! The per-type dispatch table MessageHandler consults for inbound
//! requests. Indexed by the 7-bit MCTP message type; entries are trait
//! objects rather than free function pointers, receiving the shared `Core`
//! as context (Design Notes §9).

use crate::action::Action;
use crate::core::Core;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of distinct 7-bit MCTP message type values.
pub const MAX_MESSAGE_TYPE: usize = 256;

/// A handler for one MCTP message type.
///
/// Invoked with ownership of `action` once `action.req` has been filled in
/// by MessageHandler. On an inbound request, a handler is expected to
/// produce `action.rsp` and push `action` to TMQ itself; returning without
/// doing so silently drops the request (per the handler contract, §6).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, core: &Core, action: Box<Action>);
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Option<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: (0..MAX_MESSAGE_TYPE).map(|_| None).collect(),
        }
    }

    pub fn set(&mut self, msg_type: u8, handler: Arc<dyn Handler>) {
        self.handlers[msg_type as usize] = Some(handler);
    }

    pub fn get(&self, msg_type: u8) -> Option<Arc<dyn Handler>> {
        self.handlers[msg_type as usize].clone()
    }
}

/// Shared, lockable registry so it can be replaced at runtime via
/// `Orchestrator::set_handler`, matching the original's `mctp_set_handler`/
/// `mctp_set_mh` late-bindable registry rather than one fixed at
/// construction.
pub type SharedHandlerRegistry = Mutex<HandlerRegistry>;
