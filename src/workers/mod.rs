//! # Pipeline workers
//!
//! The seven staged workers described in Design §5, one module each. Every
//! worker is a free `async fn run(...)` rather than a struct with a `run`
//! method — there is no per-worker state worth naming beyond what each
//! function's local variables already hold (a running sequence counter, a
//! Reassembler), and everything that *is* shared lives in [`crate::core::Core`].

pub mod completer;
pub mod message_handler;
pub mod packet_reader;
pub mod packet_writer;
pub mod socket_reader;
pub mod socket_writer;
pub mod submitter;
