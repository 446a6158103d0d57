//! # mctp-transport
//!
//! A userspace implementation of MCTP (Management Component Transport
//! Protocol, DMTF DSP0236 v1.3.1) over TCP: a staged, multi-worker pipeline
//! moving packets between a socket and an application-facing submit/handler
//! API, the MCTP Control state machine (message type 0), and the
//! BCD-ordered VersionRegistry it consults.
//!
//! See `DESIGN.md` in the repository root for how each module here is
//! grounded against the original implementation.

pub mod action;
pub mod codec;
pub mod config;
pub mod control;
pub mod core;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod logging;
pub mod message;
pub mod orchestrator;
pub mod packet;
pub mod pool;
pub mod shutdown;
pub mod tagtable;
pub mod version;
pub mod workers;

pub use config::{Config, Mode};
pub use core::Core;
pub use error::{McError, Result};
pub use handler::Handler;
pub use orchestrator::{Orchestrator, SubmitRequest};

/// MCTP Control, per DSP0236 — always present, always message type 0.
pub const MSG_TYPE_CONTROL: u8 = 0x00;
#[allow(dead_code)]
pub const MSG_TYPE_PLDM: u8 = 0x01;
#[allow(dead_code)]
pub const MSG_TYPE_NCSI: u8 = 0x02;
#[allow(dead_code)]
pub const MSG_TYPE_ETHERNET: u8 = 0x03;
#[allow(dead_code)]
pub const MSG_TYPE_NVME_MI: u8 = 0x04;
#[allow(dead_code)]
pub const MSG_TYPE_SPDM: u8 = 0x05;
#[allow(dead_code)]
pub const MSG_TYPE_SECURE: u8 = 0x06;
/// CXL Fabric Manager API, the primary payload type this endpoint advertises.
pub const MSG_TYPE_CXL_FM_API: u8 = 0x07;
/// CXL Component Command Interface, the secondary advertised payload type.
pub const MSG_TYPE_CXL_CCI: u8 = 0x08;
#[allow(dead_code)]
pub const MSG_TYPE_VDM_PCI: u8 = 0x7E;
#[allow(dead_code)]
pub const MSG_TYPE_VDM_IANA: u8 = 0x7F;

/// The "base" pseudo-type (0xFF) under which endpoint-wide (non-message-type
/// specific) protocol versions are registered (DSP0236 §8.4, spec Scenario
/// S3).
pub const MSG_TYPE_BASE: u8 = 0xFF;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
