//! Resource limits consulted by the stack repair.
//!
//! Mirrors the parts of `<sys/resource.h>` the fallback needs. The
//! `getrlimit` call itself lives in the ABI crate.

/// Maximum size of the process stack.
pub const RLIMIT_STACK: i32 = 3;

/// Infinity sentinel for resource limits.
pub const RLIM_INFINITY: u64 = u64::MAX;

/// Resource limit values (like `struct rlimit`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rlimit {
    /// Soft limit.
    pub rlim_cur: u64,
    /// Hard limit (ceiling for soft limit).
    pub rlim_max: u64,
}

impl Rlimit {
    /// Soft limit as a byte count, saturating at `usize::MAX`.
    ///
    /// This is the ceiling the stack may grow to, not what is committed.
    #[must_use]
    pub fn soft_as_size(&self) -> usize {
        usize::try_from(self.rlim_cur).unwrap_or(usize::MAX)
    }
}
