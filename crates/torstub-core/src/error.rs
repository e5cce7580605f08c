//! Error tiers for the interposer.
//!
//! [`CallError`] is the recoverable tier: the interposed call returns `-1`
//! and sets errno, and the host application decides what to do.
//! [`FatalError`] is the explicit fatal signal: the ABI layer prints it as a
//! labeled diagnostic and aborts the process. Nothing in this crate aborts.

use thiserror::Error;

use crate::errno;

/// Failure surfaced to the caller through the standard `-1` + errno path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("address family not supported")]
    AddressFamilyNotSupported,
    #[error("host unreachable")]
    HostUnreachable,
}

impl CallError {
    /// errno value reported to the caller.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument => errno::EINVAL,
            Self::AddressFamilyNotSupported => errno::EAFNOSUPPORT,
            Self::HostUnreachable => errno::EHOSTUNREACH,
        }
    }
}

/// Condition under which continuing to run the host process is unsafe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("`{var}` environment variable not set")]
    MissingEnv { var: &'static str },

    #[error("failed to find `{symbol}()` symbol: {reason}")]
    UnresolvedSymbol { symbol: &'static str, reason: String },

    #[error("got a 0 stack size when pid = {pid} != tid = {tid}")]
    ZeroStackOnSecondaryThread { pid: i32, tid: i32 },

    #[error("failed to query stack rlimit: {errno}")]
    StackLimitUnavailable { errno: i32 },

    #[error("{call}: {code}")]
    MutexSetup { call: &'static str, code: i32 },

    #[error("interposed call re-entered bootstrap before it completed")]
    BootstrapReentered,
}

/// Outcome of a failed stack-bounds repair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The original query failed; its return code is passed back verbatim.
    #[error("original stack query returned {0}")]
    Query(i32),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}
