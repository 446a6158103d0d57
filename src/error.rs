//! # Error Taxonomy
//!
//! The pipeline's internal currency is `Result<T, McError>`: a small,
//! match-able set of outcomes rather than a single opaque failure type,
//! because callers of [`crate::pool::BoundedQueue`] and
//! [`crate::pool::ObjectPool`] and the [submit API](crate::orchestrator)
//! need to distinguish "try again" from "gone for good" from "timed out".
//!
//! Orchestration-level glue (connection setup, configuration loading, the
//! demo binary) uses `anyhow::Result` instead, the way the rest of this
//! codebase does for errors a human reads rather than code matches on.

use thiserror::Error;

/// Outcomes from the transport pipeline's internal plumbing.
#[derive(Debug, Error)]
pub enum McError {
    /// A bounded queue or pool has no capacity left for a non-blocking push.
    #[error("queue full")]
    Full,

    /// A queue or pool was closed while a caller was waiting on it.
    #[error("queue closed")]
    Closed,

    /// A non-blocking pop/acquire found nothing available.
    #[error("queue empty")]
    Empty,

    /// The transport socket failed on read or write.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A synchronous submit's caller-supplied timeout elapsed before completion.
    #[error("action timed out waiting for completion")]
    Timeout,

    /// A packet failed wire-format validation and was dropped.
    #[error("invalid packet: {reason}")]
    InvalidPacket { reason: &'static str },

    /// The caller of `submit` gave a payload too large to carry in a Message.
    #[error("payload of {len} bytes exceeds the {max} byte message payload limit")]
    PayloadTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, McError>;
