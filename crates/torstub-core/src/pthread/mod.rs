//! Mutex construction policy for the PulseAudio compatibility shim.
//!
//! Priority-inheritance futex operations are filtered by the sandbox, so
//! mutexes handed to PulseAudio must never request them. Only the lock type
//! is chosen here; the pthread calls live in the ABI crate.

/// Recursive mutex: the owning thread can re-lock without deadlock.
pub const PTHREAD_MUTEX_RECURSIVE: i32 = 1;

/// Lock type for a PulseAudio mutex.
///
/// `None` means the attribute object keeps its default type. The caller's
/// priority-inheritance request has no input here: it is always dropped.
#[inline]
#[must_use]
pub const fn mutex_kind(recursive: bool) -> Option<i32> {
    if recursive {
        Some(PTHREAD_MUTEX_RECURSIVE)
    } else {
        None
    }
}
