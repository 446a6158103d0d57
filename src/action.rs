//! # Action — request/response correlation record
//!
//! An Action tracks one outbound request (or one locally generated inbound
//! response) through submission, transmission, reply, and retirement. It is
//! the unit of ownership that moves between TAQ, the outbound TagTable, TMQ,
//! TPQ, and ACQ: at any instant it belongs to exactly one of those (Data
//! Model invariant 3), which in this port is expressed directly as Rust
//! move semantics — an `Action` is always held by value (`Box<Action>`)
//! inside whichever container currently owns it.

use crate::message::Message;
use crate::packet::PacketWrapper;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Default maximum number of submission attempts before an action is
/// retired as failed (`MCTP_ACTION_DEFAULT_RETRY_NUM` in the source).
pub const DEFAULT_MAX_RETRY: u32 = 8;

/// A callback invoked by the Submitter or Completer at a lifecycle
/// transition. Receives the action by reference; it has already been
/// mutated (timestamps, completion code) before the callback runs.
pub type ActionCallback = Arc<dyn Fn(&Action) + Send + Sync>;

pub struct Action {
    pub req: Option<Box<Message>>,
    pub rsp: Option<Box<Message>>,
    /// Packets queued for transmission for this action. Populated by
    /// PacketWriter, walked by SocketWriter, drained back to the packet
    /// pool on retirement.
    pub pw: Vec<PacketWrapper>,

    pub created: Instant,
    pub submitted: Option<Instant>,
    pub completed: Option<Instant>,

    /// 0 = success, non-zero = failure code.
    pub completion_code: i32,
    pub num: u32,
    pub max: u32,

    pub user_data: Option<Arc<dyn Any + Send + Sync>>,

    pub on_submitted: Option<ActionCallback>,
    pub on_completed: Option<ActionCallback>,
    pub on_failed: Option<ActionCallback>,

    /// Single-shot signal for a synchronous `submit` caller: the Completer
    /// adds a permit when the action is retired; the caller acquires with a
    /// timeout.
    pub notify: Option<Arc<Semaphore>>,

    /// Set by the Submitter's admission pass when it assigns this action a
    /// tag slot. Unlike the original's shared-pointer `tags[]` array, the
    /// Rust port tracks tag reservation separately from the TagTable's
    /// ownership of the action (see `core::TagState`), so whichever worker
    /// finally retires this action needs to know whether a reservation is
    /// still outstanding and must be released. Always `false` for locally
    /// generated response actions, which never go through tag admission.
    pub reserved_tag: bool,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("has_req", &self.req.is_some())
            .field("has_rsp", &self.rsp.is_some())
            .field("pw_len", &self.pw.len())
            .field("num", &self.num)
            .field("max", &self.max)
            .field("completion_code", &self.completion_code)
            .finish()
    }
}

impl Action {
    /// A freshly pool-allocated, cleared Action ready for reuse.
    pub fn empty() -> Self {
        Self {
            req: None,
            rsp: None,
            pw: Vec::new(),
            created: Instant::now(),
            submitted: None,
            completed: None,
            completion_code: 0,
            num: 0,
            max: DEFAULT_MAX_RETRY,
            user_data: None,
            on_submitted: None,
            on_completed: None,
            on_failed: None,
            notify: None,
            reserved_tag: false,
        }
    }

    /// Reset a pool-recycled Action back to a clean slate before reuse.
    /// `pw` must already be empty (the caller is expected to have drained
    /// it back to the packet pool during retirement).
    pub fn reset(&mut self) {
        debug_assert!(self.pw.is_empty(), "retiring an action with packets still attached");
        self.req = None;
        self.rsp = None;
        self.pw.clear();
        self.created = Instant::now();
        self.submitted = None;
        self.completed = None;
        self.completion_code = 0;
        self.num = 0;
        self.max = DEFAULT_MAX_RETRY;
        self.user_data = None;
        self.on_submitted = None;
        self.on_completed = None;
        self.on_failed = None;
        self.notify = None;
        self.reserved_tag = false;
    }
}
