//! # EndpointState
//!
//! The local MCTP endpoint's identity: its assigned EID (if any), the bus
//! owner that assigned it, its UUID, and a verbosity hint surfaced at
//! startup (see `SPEC_FULL.md` §A.1 — actual log filtering goes through
//! `tracing`/`RUST_LOG`, not this mask).

use uuid::Uuid;

/// The Null EID: unassigned.
pub const EID_NULL: u8 = 0x00;
/// The Broadcast EID.
pub const EID_BROADCAST: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity(pub u32);

impl Verbosity {
    pub const ERROR: u32 = 0x01 << 0;
    pub const THREADS: u32 = 0x01 << 1;
    pub const STEPS: u32 = 0x01 << 2;
    pub const PACKET: u32 = 0x01 << 3;
    pub const MESSAGE: u32 = 0x01 << 4;

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone)]
pub struct EndpointState {
    pub eid: u8,
    pub bus_owner_eid: u8,
    pub uuid: [u8; 16],
    pub verbosity: Verbosity,
}

impl EndpointState {
    /// A fresh endpoint: unassigned EID, freshly generated UUID.
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            eid: EID_NULL,
            bus_owner_eid: EID_NULL,
            uuid: *Uuid::new_v4().as_bytes(),
            verbosity,
        }
    }

    pub fn is_eid_set(&self) -> bool {
        self.eid != EID_NULL
    }
}
