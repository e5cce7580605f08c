//! PulseAudio compatibility exports.
//!
//! Priority-inheritance futexes are rejected by the sandbox's syscall filter,
//! and PulseAudio decides to request them at build time. `pa_mutex_new` is
//! replaced with a version that never does. `pa_start_child_for_read` only
//! spawns the GConf helper and is stubbed to fail.

use std::ffi::{c_char, c_int};

use torstub_core::FatalError;
use torstub_core::errno::ENOMEM;
use torstub_core::pthread::{self as pthread_core, PTHREAD_MUTEX_RECURSIVE};

#[cfg(not(test))]
use crate::bootstrap;
use crate::macros::abi_fn;

const _: () = assert!(PTHREAD_MUTEX_RECURSIVE == libc::PTHREAD_MUTEX_RECURSIVE);

/// Layout-compatible with PulseAudio's private `pa_mutex`.
#[repr(C)]
pub struct PaMutex {
    pub mutex: libc::pthread_mutex_t,
}

/// Allocate and initialize a mutex without priority inheritance.
pub fn pa_mutex_create(recursive: bool) -> Result<*mut PaMutex, FatalError> {
    // SAFETY: pthread_mutexattr_init fully initializes the object.
    let mut attr: libc::pthread_mutexattr_t = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::pthread_mutexattr_init(&mut attr) };
    if rc != 0 {
        return Err(FatalError::MutexSetup {
            call: "pthread_mutexattr_init()",
            code: rc,
        });
    }

    let result = init_with_attr(&mut attr, recursive);
    unsafe { libc::pthread_mutexattr_destroy(&mut attr) };
    result
}

fn init_with_attr(
    attr: &mut libc::pthread_mutexattr_t,
    recursive: bool,
) -> Result<*mut PaMutex, FatalError> {
    if let Some(kind) = pthread_core::mutex_kind(recursive) {
        let rc = unsafe { libc::pthread_mutexattr_settype(attr, kind) };
        if rc != 0 {
            return Err(FatalError::MutexSetup {
                call: "pthread_mutexattr_settype(PTHREAD_MUTEX_RECURSIVE)",
                code: rc,
            });
        }
    }

    // PulseAudio frees this with free(), so it must come from malloc.
    let m = unsafe { libc::malloc(std::mem::size_of::<PaMutex>()) }.cast::<PaMutex>();
    if m.is_null() {
        return Err(FatalError::MutexSetup {
            call: "malloc()",
            code: ENOMEM,
        });
    }

    let rc = unsafe { libc::pthread_mutex_init(std::ptr::addr_of_mut!((*m).mutex), attr) };
    if rc != 0 {
        unsafe { libc::free(m.cast()) };
        return Err(FatalError::MutexSetup {
            call: "pthread_mutex_init()",
            code: rc,
        });
    }
    Ok(m)
}

abi_fn! {
    fn pa_mutex_new(recursive: bool, _inherit_priority: bool) -> *mut PaMutex {
        match pa_mutex_create(recursive) {
            Ok(m) => m,
            Err(err) => bootstrap::fatal(&err),
        }
    }
}

abi_fn! {
    fn pa_start_child_for_read(
        _name: *const c_char,
        _argv1: *const c_char,
        _pid: *mut libc::pid_t,
    ) -> c_int {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(m: *mut PaMutex) {
        unsafe {
            assert_eq!(libc::pthread_mutex_destroy(std::ptr::addr_of_mut!((*m).mutex)), 0);
            libc::free(m.cast());
        }
    }

    #[test]
    fn recursive_mutex_relocks_on_owner_thread() {
        let m = pa_mutex_create(true).unwrap();
        let raw = unsafe { std::ptr::addr_of_mut!((*m).mutex) };
        unsafe {
            assert_eq!(libc::pthread_mutex_lock(raw), 0);
            assert_eq!(libc::pthread_mutex_lock(raw), 0);
            assert_eq!(libc::pthread_mutex_unlock(raw), 0);
            assert_eq!(libc::pthread_mutex_unlock(raw), 0);
        }
        release(m);
    }

    #[test]
    fn default_mutex_is_not_reentrant() {
        let m = pa_mutex_create(false).unwrap();
        let raw = unsafe { std::ptr::addr_of_mut!((*m).mutex) };
        unsafe {
            assert_eq!(libc::pthread_mutex_lock(raw), 0);
            assert_eq!(libc::pthread_mutex_trylock(raw), libc::EBUSY);
            assert_eq!(libc::pthread_mutex_unlock(raw), 0);
        }
        release(m);
    }
}
