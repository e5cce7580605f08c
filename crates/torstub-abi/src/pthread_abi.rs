//! ABI layer for `pthread_attr_getstack()`.
//!
//! Without `/proc`, glibc cannot size the initial thread's stack and reports
//! zero, which the browser treats as fatal. The recovery algorithm lives in
//! `torstub_core::stack`; this module supplies the platform calls it needs.

use std::ffi::{c_int, c_void};

use torstub_core::resource::Rlimit;
use torstub_core::stack::{StackBounds, StackPlatform};
use torstub_core::{StackError, repair_stack_bounds};

use crate::bootstrap::{self, GetStackFn};
use crate::macros::{abi_fn, diag_debug, diag_warn};
use crate::util::last_errno;

/// [`StackPlatform`] over one attribute object and the original query.
pub struct AttrStack {
    attr: *const libc::pthread_attr_t,
    getstack: GetStackFn,
}

impl AttrStack {
    /// # Safety
    ///
    /// `attr` must be valid for the lifetime of the returned value.
    pub unsafe fn new(attr: *const libc::pthread_attr_t, getstack: GetStackFn) -> Self {
        Self { attr, getstack }
    }
}

impl StackPlatform for AttrStack {
    fn attr_stack(&self) -> Result<StackBounds, i32> {
        let mut addr: *mut c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = unsafe { (self.getstack)(self.attr, &mut addr, &mut size) };
        if rc != 0 {
            return Err(rc);
        }
        Ok(StackBounds {
            addr: addr as usize,
            size,
        })
    }

    fn attr_stacksize(&self) -> Result<usize, i32> {
        let mut size: libc::size_t = 0;
        let rc = unsafe { libc::pthread_attr_getstacksize(self.attr, &mut size) };
        if rc != 0 { Err(rc) } else { Ok(size) }
    }

    fn stack_rlimit(&self) -> Result<Rlimit, i32> {
        let mut rl = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut rl) } != 0 {
            return Err(last_errno(libc::EINVAL));
        }
        Ok(Rlimit {
            rlim_cur: rl.rlim_cur as u64,
            rlim_max: rl.rlim_max as u64,
        })
    }

    fn pid(&self) -> i32 {
        unsafe { libc::getpid() }
    }

    fn tid(&self) -> i32 {
        unsafe { libc::syscall(libc::SYS_gettid) as i32 }
    }

    fn page_size(&self) -> usize {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(page).unwrap_or(0)
    }

    fn probe_address(&self) -> usize {
        let marker = 0u8;
        std::hint::black_box(&marker) as *const u8 as usize
    }
}

/// `pthread_attr_getstack()` with zero-size repair.
///
/// # Safety
///
/// `attr` must point to an initialized attribute object; `stackaddr` and
/// `stacksize` must be null or writable.
pub unsafe fn getstack_with(
    getstack: GetStackFn,
    environ_snapshot: usize,
    attr: *const libc::pthread_attr_t,
    stackaddr: *mut *mut c_void,
    stacksize: *mut libc::size_t,
) -> c_int {
    if stackaddr.is_null() || stacksize.is_null() {
        return libc::EINVAL;
    }

    let platform = unsafe { AttrStack::new(attr, getstack) };
    match repair_stack_bounds(&platform, environ_snapshot) {
        Ok(repair) => {
            if !repair.is_untouched() {
                diag_debug!(
                    "pthread_attr_getstack: fallback stackaddr {:#x} ({:?}), stacksize {} ({:?})",
                    repair.bounds.addr,
                    repair.addr_source,
                    repair.bounds.size,
                    repair.size_source
                );
            }
            unsafe {
                *stackaddr = repair.bounds.addr as *mut c_void;
                *stacksize = repair.bounds.size;
            }
            0
        }
        Err(StackError::Query(rc)) => {
            diag_warn!("pthread_attr_getstack({attr:p}, {stackaddr:p}, {stacksize:p}) = {rc}");
            rc
        }
        Err(StackError::Fatal(err)) => bootstrap::fatal(&err),
    }
}

abi_fn! {
    fn pthread_attr_getstack(
        attr: *const libc::pthread_attr_t,
        stackaddr: *mut *mut c_void,
        stacksize: *mut libc::size_t,
    ) -> c_int {
        let state = bootstrap::state();
        getstack_with(
            state.originals.pthread_attr_getstack,
            state.config.environ_snapshot,
            attr,
            stackaddr,
            stacksize,
        )
    }
}
