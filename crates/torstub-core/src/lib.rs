//! # torstub-core
//!
//! Pure decision logic for the torstub interposer.
//!
//! Everything here operates on plain integers and byte slices so it can be
//! exercised without loading the shared object into a host process. The
//! `torstub-abi` crate owns every raw pointer, every resolved symbol, and the
//! process-abort path; it calls into this crate to decide what to do.
//!
//! ```text
//! host call -> ABI entry (torstub-abi) -> decision (this crate) -> original or synthesized result
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod dlfcn;
pub mod errno;
pub mod error;
pub mod pthread;
pub mod resource;
pub mod socket;
pub mod stack;

pub use config::{LocalTarget, StubConfig, TargetKind};
pub use error::{CallError, FatalError, StackError};
pub use socket::{ConnectRoute, route_connect, socket_domain};
pub use stack::{StackBounds, StackPlatform, StackRepair, repair_stack_bounds};
