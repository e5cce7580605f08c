//! Probe and verification harness for torstub.
//!
//! This crate provides:
//! - Probes: run one routing, socket, config or stack-estimate decision and
//!   report it as JSON
//! - Verify: the behavioral property suite over `torstub-core`
//! - Structured logging: JSONL records for verification runs

#![forbid(unsafe_code)]

pub mod error;
pub mod probe;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
pub use verify::VerificationResult;
