//! # Transport configuration
//!
//! A plain data struct decoupled from any CLI-parsing crate (see
//! `SPEC_FULL.md` §A.3): the demo binary's `clap::Args` converts into this,
//! but embedders constructing an `Orchestrator` directly never need `clap`
//! as a dependency.

use crate::endpoint::Verbosity;
use std::net::Ipv4Addr;

/// Default TCP port this transport listens on/connects to (spec §6).
pub const DEFAULT_PORT: u16 = 2508;

/// Which side of the TCP connection this endpoint takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bind and `accept()`, looping to serve one connection at a time.
    Server,
    /// `connect()` once to a remote server.
    Client,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to bind (server) or connect to (client).
    pub port: u16,
    /// Address to bind (server) or connect to (client).
    pub address: Ipv4Addr,
    pub mode: Mode,
    /// Run each pipeline worker in blocking mode (`wait = true`) versus
    /// polling its queue on `core::POLL_INTERVAL` (`wait = false`). The
    /// original's `m->use_threads`/`m->wait` distinction: non-worker mode is
    /// meant for single-threaded embedding where the caller drives progress
    /// by polling rather than dedicating a thread per stage.
    pub use_workers: bool,
    /// If true, `Orchestrator::run` spawns the connection loop and returns
    /// as soon as the first connection's pipeline is up (bounded by a
    /// 1-second handshake), instead of blocking until shutdown.
    pub non_blocking_start: bool,
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            address: Ipv4Addr::UNSPECIFIED,
            mode: Mode::Server,
            use_workers: true,
            non_blocking_start: false,
            verbosity: Verbosity::default(),
        }
    }
}
