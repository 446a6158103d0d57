//! # Core — shared pipeline context
//!
//! `Arc<Core>` is what every pipeline worker task holds: the three object
//! pools, the six inter-worker queues, the outbound tag table, the handler
//! registry, and the Control-layer state. One `Core` per connection — no
//! module-scope globals (Design Notes §9).

use crate::action::Action;
use crate::control::ControlState;
use crate::endpoint::EndpointState;
use crate::handler::{HandlerRegistry, SharedHandlerRegistry};
use crate::message::Message;
use crate::packet::PacketWrapper;
use crate::pool::{BoundedQueue, ObjectPool};
use crate::tagtable::{TagTable, NUM_TAGS};
use crate::version::VersionRegistry;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Non-blocking workers poll their input queue on this interval rather than
/// spinning; only reached when a worker is configured with `wait = false`
/// (Design Notes §9, "use_workers").
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Outbound tag bookkeeping: the correlation table itself plus a separate
/// reservation bitmap.
///
/// The original's `tags[]` array is a raw-pointer table: the same Action is
/// reachable from it *and* from whichever queue is currently carrying it
/// towards the wire, because C pointers don't enforce exclusive ownership.
/// `Action` here is always owned by value (Design Notes §9), so a tag must
/// be reserved the moment Submitter admits it (to stop a second admission
/// from reusing the same slot while the first is still mid-transmission)
/// without the table actually holding the Action until it comes back from
/// SocketWriter awaiting a reply. `reserved` tracks the former; `table`
/// holds the Action only once it is genuinely idle, waiting on a response.
pub struct TagState {
    pub table: TagTable<Box<Action>>,
    pub reserved: [bool; NUM_TAGS],
}

impl Default for TagState {
    fn default() -> Self {
        Self {
            table: TagTable::new(),
            reserved: [false; NUM_TAGS],
        }
    }
}

impl TagState {
    /// First tag that is neither reserved nor occupied.
    pub fn first_free(&self) -> Option<u8> {
        (0..NUM_TAGS as u8).find(|&t| !self.reserved[t as usize] && !self.table.is_occupied(t))
    }
}

pub const PKT_POOL_SIZE: usize = 1024;
pub const MSG_POOL_SIZE: usize = 128;
pub const ACTION_POOL_SIZE: usize = 128;

pub const RPQ_SIZE: usize = 1024;
pub const TPQ_SIZE: usize = 1024;
pub const RMQ_SIZE: usize = 128;
pub const TMQ_SIZE: usize = 128;
pub const TAQ_SIZE: usize = 128;
pub const ACQ_SIZE: usize = 128;

/// Shared context for one connection's pipeline: pools, queues, the
/// outbound correlation table, the handler registry and Control state.
pub struct Core {
    pub pkt_pool: ObjectPool<PacketWrapper>,
    pub msg_pool: ObjectPool<Box<Message>>,
    pub action_pool: ObjectPool<Box<Action>>,

    /// Receive Packet Queue: SocketReader -> PacketReader.
    pub rpq: BoundedQueue<PacketWrapper>,
    /// Receive Message Queue: PacketReader -> MessageHandler.
    pub rmq: BoundedQueue<Box<Message>>,
    /// Transmit Action Queue: handlers/submit() -> Submitter.
    pub taq: BoundedQueue<Box<Action>>,
    /// Transmit Message Queue: Submitter/handlers -> PacketWriter.
    pub tmq: BoundedQueue<Box<Action>>,
    /// Transmit Packet Queue: PacketWriter -> SocketWriter.
    pub tpq: BoundedQueue<Box<Action>>,
    /// Action Completion Queue: SocketWriter/Submitter -> Completer.
    pub acq: BoundedQueue<Box<Action>>,

    /// Outbound correlation table (`tags_mtx` in the original): read by
    /// MessageHandler's response path, written by Submitter's retry and
    /// admission passes.
    pub tags: StdMutex<TagState>,

    pub handlers: SharedHandlerRegistry,
    pub control: ControlState,

    /// Wakes the Submitter's poll loop as soon as TAQ gains an entry,
    /// instead of making every submission wait out the full thread delta.
    pub submit_wake: Notify,
}

impl Core {
    pub fn new(endpoint: EndpointState, versions: VersionRegistry) -> Self {
        Self {
            pkt_pool: ObjectPool::new(PKT_POOL_SIZE, PacketWrapper::empty),
            msg_pool: ObjectPool::new(MSG_POOL_SIZE, || Box::new(Message::empty())),
            action_pool: ObjectPool::new(ACTION_POOL_SIZE, || Box::new(Action::empty())),
            rpq: BoundedQueue::new(RPQ_SIZE),
            rmq: BoundedQueue::new(RMQ_SIZE),
            taq: BoundedQueue::new(TAQ_SIZE),
            tmq: BoundedQueue::new(TMQ_SIZE),
            tpq: BoundedQueue::new(TPQ_SIZE),
            acq: BoundedQueue::new(ACQ_SIZE),
            tags: StdMutex::new(TagState::default()),
            handlers: SharedHandlerRegistry::new(HandlerRegistry::new()),
            control: ControlState::new(endpoint, versions),
            submit_wake: Notify::new(),
        }
    }

    /// Release `action`'s tag reservation, if it holds one. Called exactly
    /// once by whichever path finally retires an Action that went through
    /// Submitter's admission pass: MessageHandler on response receipt,
    /// Submitter itself on retry exhaustion, or Completer for anything
    /// retired via ACQ (a failed send, or a synchronously completed
    /// request). Locally generated response actions never reserve a tag, so
    /// this is a no-op for them.
    pub fn retire_tag(&self, action: &Action) {
        if !action.reserved_tag {
            return;
        }
        if let Some(req) = action.req.as_ref() {
            let mut tags = self.tags.lock().unwrap();
            tags.reserved[req.tag as usize & (NUM_TAGS - 1)] = false;
        }
    }

    /// Return every resource an action holds to its pool: `req`/`rsp`
    /// messages, any still-attached packet wrappers, and finally the action
    /// itself. Mirrors `mctp_retire` in the original source. Callers are
    /// responsible for releasing the action's tag reservation first (via
    /// [`Core::retire_tag`]) and for invoking any `on_completed`/`on_failed`
    /// callback before calling this, since a callback — not this function —
    /// decides whether the caller's synchronous `notify` semaphore should
    /// be posted.
    pub fn recycle(&self, mut action: Box<Action>) {
        if let Some(req) = action.req.take() {
            self.msg_pool.release(req);
        }
        if let Some(rsp) = action.rsp.take() {
            self.msg_pool.release(rsp);
        }
        for wrapper in action.pw.drain(..) {
            self.pkt_pool.release(wrapper);
        }
        action.reset();
        self.action_pool.release(action);
    }

    /// Close every queue and pool, waking any blocked `pop`/`acquire` with
    /// `Closed`. Called once per connection teardown; each connection gets
    /// a fresh `Core`, so there is no queue-draining/reseeding step to
    /// mirror from the original's `mctp_configure` — a new `Core::new`
    /// already starts full.
    pub async fn shutdown(&self) {
        self.rpq.close().await;
        self.rmq.close().await;
        self.taq.close().await;
        self.tmq.close().await;
        self.tpq.close().await;
        self.acq.close().await;
        self.pkt_pool.close().await;
        self.msg_pool.close().await;
        self.action_pool.close().await;
        self.submit_wake.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointState;
    use crate::version::VersionRegistry;

    fn test_core() -> Core {
        Core::new(EndpointState::new(Default::default()), VersionRegistry::new())
    }

    /// Testable Property 7: every pool always has exactly `capacity` objects
    /// either in circulation or sitting idle in the pool; draining it
    /// completely and releasing everything back restores it to full.
    #[tokio::test]
    async fn pool_conservation_round_trips_to_capacity() {
        let core = test_core();

        let mut held = Vec::with_capacity(ACTION_POOL_SIZE);
        for _ in 0..ACTION_POOL_SIZE {
            held.push(core.action_pool.acquire(true).await.unwrap());
        }
        assert!(matches!(core.action_pool.acquire(false).await, Err(crate::error::McError::Empty)));

        for action in held {
            core.action_pool.release(action);
        }
        for _ in 0..ACTION_POOL_SIZE {
            core.action_pool.acquire(true).await.unwrap();
        }
    }

    #[test]
    fn retire_tag_is_noop_without_reservation() {
        let core = test_core();
        let action = Action::empty();
        // reserved_tag defaults to false; this must not panic or flip any
        // reservation bit.
        core.retire_tag(&action);
        let tags = core.tags.lock().unwrap();
        assert!(tags.reserved.iter().all(|&r| !r));
    }
}
