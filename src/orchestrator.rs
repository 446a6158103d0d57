//! # Orchestrator
//!
//! Owns connection lifecycle (bind/listen/accept for a server, connect-once
//! for a client), builds a fresh [`Core`] per connection, spawns the seven
//! pipeline workers against it, and exposes the application-facing
//! `submit`/`set_handler`/`stop` surface. Grounded on `mctp_run` /
//! `mctp_connection_handler` / `mctp_configure` / `mctp_submit` /
//! `mctp_stop` / `mctp_request_stop` in the original source (see
//! `DESIGN.md`).
//!
//! One `Orchestrator` per endpoint identity; many connections (serially,
//! for a server) may be served over its lifetime. The endpoint's EID and
//! UUID persist across reconnects exactly as the original's `mctp_configure`
//! leaves them (it only resets `bus_owner_eid`); the version registry is
//! immutable after construction and simply re-seeded into each new `Core`.

use crate::action::{ActionCallback, DEFAULT_MAX_RETRY};
use crate::config::{Config, Mode};
use crate::control::ControlHandler;
use crate::core::Core;
use crate::endpoint::{EndpointState, EID_NULL};
use crate::error::{McError, Result as McResult};
use crate::handler::Handler;
use crate::message::MAX_MESSAGE_PAYLOAD;
use crate::shutdown::ShutdownSignal;
use crate::version::{VersionEntry, VersionRegistry};
use crate::workers;
use anyhow::{anyhow, Context, Result};
use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Request retry timeout between resubmissions of an outstanding action
/// (`action_delta` in the original, spec §4.7).
const ACTION_DELTA: Duration = Duration::from_millis(100);
/// Submitter's poll tick when not woken early by `core.submit_wake`.
const SUBMIT_THREAD_DELTA: Duration = Duration::from_millis(1);
/// Bound on how long `run()` waits for the first connection's pipeline to
/// come up before returning, in non-blocking-start mode (`SPEC_FULL.md` §A.5).
const READY_TIMEOUT: Duration = Duration::from_secs(1);

/// A request to transmit a message and track its reply, handed to
/// [`Orchestrator::submit`].
pub struct SubmitRequest {
    pub dst: u8,
    pub msg_type: u8,
    pub payload: Vec<u8>,
    /// `-1` = infinite retries, `< -1` = default ([`DEFAULT_MAX_RETRY`]),
    /// otherwise the literal maximum attempt count.
    pub retry: i32,
    /// If set, `submit` blocks up to this duration for completion and
    /// returns [`McError::Timeout`] if it elapses first.
    pub timeout: Option<Duration>,
    pub user_data: Option<Arc<dyn Any + Send + Sync>>,
    pub on_submitted: Option<ActionCallback>,
    pub on_completed: Option<ActionCallback>,
    pub on_failed: Option<ActionCallback>,
}

impl SubmitRequest {
    pub fn new(dst: u8, msg_type: u8, payload: Vec<u8>) -> Self {
        Self {
            dst,
            msg_type,
            payload,
            retry: -2,
            timeout: None,
            user_data: None,
            on_submitted: None,
            on_completed: None,
            on_failed: None,
        }
    }
}

struct ConnectionHandle {
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

pub struct Orchestrator {
    config: Config,
    endpoint: StdMutex<EndpointState>,
    versions: VersionRegistry,
    handler_overrides: StdMutex<Vec<(u8, Arc<dyn Handler>)>>,
    current: StdMutex<Option<Arc<Core>>>,
    top_shutdown: ShutdownSignal,
    top_rx: tokio::sync::watch::Receiver<bool>,
    run_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Arc<Self> {
        let mut versions = VersionRegistry::new();
        // "Advertised capabilities": base and control-message versions F1.F3.F1.
        let base_version = VersionEntry { major: 0xF1, minor: 0xF3, update: 0xF1, alpha: 0x00 };
        versions.insert(crate::MSG_TYPE_BASE, base_version);
        versions.insert(crate::MSG_TYPE_CONTROL, base_version);

        let (top_shutdown, top_rx) = ShutdownSignal::new();
        let verbosity = config.verbosity;
        Arc::new(Self {
            config,
            endpoint: StdMutex::new(EndpointState::new(verbosity)),
            versions,
            handler_overrides: StdMutex::new(Vec::new()),
            current: StdMutex::new(None),
            top_shutdown,
            top_rx,
            run_task: StdMutex::new(None),
        })
    }

    /// Register (or replace) the handler for `msg_type`. Applied to the
    /// currently active connection immediately, and to every connection
    /// accepted/established afterwards — matching `mctp_set_handler` /
    /// `mctp_set_mh`'s late-bindable registry.
    pub async fn set_handler(&self, msg_type: u8, handler: Arc<dyn Handler>) {
        self.handler_overrides.lock().unwrap().push((msg_type, handler.clone()));
        if let Some(core) = self.current.lock().unwrap().clone() {
            core.handlers.lock().await.set(msg_type, handler);
        }
    }

    /// Bind (server) or connect (client) and start serving. In blocking mode
    /// (`config.non_blocking_start == false`) this runs until [`Self::stop`]
    /// is called or an unrecoverable I/O error occurs. In non-blocking mode
    /// it spawns the connection loop and returns once the first connection's
    /// pipeline is up, bounded by a 1-second handshake.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        if self.config.non_blocking_start {
            let (ready_tx, ready_rx) = oneshot::channel();
            let orch = self.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = orch.connection_loop(Some(ready_tx)).await {
                    warn!(error = %e, "orchestrator: connection loop ended with error");
                }
            });
            *self.run_task.lock().unwrap() = Some(task);
            match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(anyhow!("connection loop dropped before signaling ready")),
                Err(_) => Err(anyhow!("pipeline did not become ready within {READY_TIMEOUT:?}")),
            }
        } else {
            self.connection_loop(None).await
        }
    }

    /// External shutdown request: stop serving and tear down the current
    /// connection, if any. Distinct from a worker's internal
    /// `ShutdownSignal::trigger` only in who is allowed to call it — the
    /// mechanism underneath is the same watch channel
    /// (`mctp_stop` vs `mctp_request_stop` in the original).
    pub async fn stop(&self) {
        self.top_shutdown.trigger();
        if let Some(core) = self.current.lock().unwrap().clone() {
            core.shutdown().await;
        }
        let task = self.run_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn connection_loop(self: &Arc<Self>, mut ready_tx: Option<oneshot::Sender<()>>) -> Result<()> {
        let addr = SocketAddr::new(IpAddr::V4(self.config.address), self.config.port);
        let listener = match self.config.mode {
            Mode::Server => Some(TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?),
            Mode::Client => None,
        };

        loop {
            if self.top_shutdown.is_triggered() {
                break;
            }

            let endpoint = {
                let mut guard = self.endpoint.lock().unwrap();
                guard.bus_owner_eid = EID_NULL;
                guard.clone()
            };
            let core = Arc::new(Core::new(endpoint, self.versions.clone()));
            {
                let mut registry = core.handlers.lock().await;
                registry.set(crate::MSG_TYPE_CONTROL, Arc::new(ControlHandler));
                for (msg_type, handler) in self.handler_overrides.lock().unwrap().iter() {
                    registry.set(*msg_type, handler.clone());
                }
            }

            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(());
            }

            let stream = match &listener {
                Some(listener) => match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!(%peer, "orchestrator: accepted connection");
                        stream
                    }
                    Err(e) => {
                        warn!(error = %e, "orchestrator: accept failed");
                        continue;
                    }
                },
                None => TcpStream::connect(addr).await.with_context(|| format!("connecting to {addr}"))?,
            };
            let _ = stream.set_nodelay(true);

            let handle = self.spawn_connection(core.clone(), stream);
            *self.current.lock().unwrap() = Some(core.clone());

            let mut conn_rx = handle.shutdown.subscribe();
            let mut top_rx = self.top_rx.clone();
            tokio::select! {
                _ = conn_rx.changed() => {}
                _ = top_rx.changed() => { handle.shutdown.trigger(); }
            }

            core.shutdown().await;
            let _ = handle.task.await;
            *self.current.lock().unwrap() = None;

            let final_endpoint = core.control.endpoint.lock().unwrap().clone();
            let mut guard = self.endpoint.lock().unwrap();
            guard.eid = final_endpoint.eid;
            guard.bus_owner_eid = EID_NULL;

            if self.top_shutdown.is_triggered() || matches!(self.config.mode, Mode::Client) {
                break;
            }
        }
        Ok(())
    }

    fn spawn_connection(self: &Arc<Self>, core: Arc<Core>, stream: TcpStream) -> ConnectionHandle {
        let (shutdown, _rx) = ShutdownSignal::new();
        let (reader, writer) = stream.into_split();
        let wait = self.config.use_workers;

        let mut handles = Vec::with_capacity(7);
        handles.push(tokio::spawn(workers::socket_reader::run(core.clone(), reader, wait, shutdown.clone())));
        handles.push(tokio::spawn(workers::socket_writer::run(core.clone(), writer, wait, shutdown.clone())));
        handles.push(tokio::spawn(workers::packet_reader::run(core.clone(), wait, shutdown.clone())));
        handles.push(tokio::spawn(workers::packet_writer::run(core.clone(), wait, shutdown.clone())));
        handles.push(tokio::spawn(workers::message_handler::run(core.clone(), wait, shutdown.clone())));
        handles.push(tokio::spawn(workers::submitter::run(core.clone(), ACTION_DELTA, SUBMIT_THREAD_DELTA, shutdown.clone())));
        handles.push(tokio::spawn(workers::completer::run(core.clone(), wait, shutdown.clone())));

        let task = tokio::spawn(async move {
            for h in handles {
                let _ = h.await;
            }
        });

        ConnectionHandle { shutdown, task }
    }

    /// Submit a message for transmission, correlating its reply by tag.
    /// Mirrors `mctp_submit`: validates the payload, pool-allocates a
    /// request Message and an Action, pushes to TAQ, and — if
    /// `req.timeout` is set — blocks on the action's single-shot semaphore
    /// until the Completer posts it or the timeout elapses.
    pub async fn submit(&self, req: SubmitRequest) -> McResult<()> {
        if req.payload.is_empty() {
            return Err(McError::InvalidPacket { reason: "submit payload must be non-empty" });
        }
        if req.payload.len() > MAX_MESSAGE_PAYLOAD {
            return Err(McError::PayloadTooLarge { len: req.payload.len(), max: MAX_MESSAGE_PAYLOAD });
        }

        let core = self.current.lock().unwrap().clone().ok_or(McError::Closed)?;

        let mut msg = core.msg_pool.acquire(true).await?;
        msg.reset();
        msg.dst = req.dst;
        msg.owner = true;
        msg.msg_type = req.msg_type;
        msg.len = req.payload.len();
        msg.payload[..req.payload.len()].copy_from_slice(&req.payload);

        let mut action = core.action_pool.acquire(true).await?;
        action.reset();
        action.req = Some(msg);
        action.max = if req.retry == -1 {
            u32::MAX
        } else if req.retry < -1 {
            DEFAULT_MAX_RETRY
        } else {
            req.retry as u32
        };
        action.user_data = req.user_data;
        action.on_submitted = req.on_submitted;
        action.on_completed = req.on_completed;
        action.on_failed = req.on_failed;

        let semaphore = req.timeout.map(|_| Arc::new(Semaphore::new(0)));
        action.notify = semaphore.clone();

        core.taq.push(action)?;
        core.submit_wake.notify_waiters();

        if let (Some(timeout), Some(semaphore)) = (req.timeout, semaphore) {
            match tokio::time::timeout(timeout, semaphore.acquire()).await {
                Ok(Ok(permit)) => {
                    permit.forget();
                    Ok(())
                }
                Ok(Err(_)) => Err(McError::Closed),
                Err(_) => Err(McError::Timeout),
            }
        } else {
            Ok(())
        }
    }
}
