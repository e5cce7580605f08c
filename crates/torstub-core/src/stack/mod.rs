//! Stack-bounds recovery for the initial thread.
//!
//! glibc derives the initial thread's stack geometry by reading
//! `/proc/self/maps`. Inside the sandbox `/proc` is absent, so
//! `pthread_attr_getstack()` reports a zero size for that thread and the
//! browser crashes. [`repair_stack_bounds`] runs the original query and, only
//! when it yields a zero size, reconstructs usable values:
//!
//! 1. size from `pthread_attr_getstacksize()`, else from the soft
//!    `RLIMIT_STACK` (an upper bound, not the committed size);
//! 2. base address, if still unknown, from the environment block snapshot
//!    taken at load time, accepted only if a live stack address falls inside
//!    the resulting range.
//!
//! All address math is plain `usize` arithmetic; nothing is dereferenced.

use crate::error::{FatalError, StackError};
use crate::resource::Rlimit;

/// Page size assumed when the platform reports something unusable.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Stack geometry as reported by `pthread_attr_getstack()`.
///
/// `addr` is the lowest address of the stack; `0` stands for a null pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackBounds {
    pub addr: usize,
    pub size: usize,
}

/// Which stage supplied the returned size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSource {
    Platform,
    AttrStackSize,
    ResourceLimit,
}

/// Which stage supplied the returned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSource {
    Platform,
    Estimated,
    /// No trustworthy address; the caller sees null.
    Unknown,
}

/// Successful result of [`repair_stack_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRepair {
    pub bounds: StackBounds,
    pub size_source: SizeSource,
    pub addr_source: AddrSource,
}

impl StackRepair {
    /// `true` when the original query's answer was returned untouched.
    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.size_source == SizeSource::Platform
    }
}

/// Platform capabilities the repair needs.
///
/// The ABI crate implements this over the resolved original
/// `pthread_attr_getstack` and libc; tests substitute scripted values.
pub trait StackPlatform {
    /// The original `pthread_attr_getstack()`; `Err` carries its return code.
    fn attr_stack(&self) -> Result<StackBounds, i32>;
    /// `pthread_attr_getstacksize()` on the same attribute object.
    fn attr_stacksize(&self) -> Result<usize, i32>;
    /// `getrlimit(RLIMIT_STACK)`; `Err` carries errno.
    fn stack_rlimit(&self) -> Result<Rlimit, i32>;
    fn pid(&self) -> i32;
    /// Kernel thread id of the calling thread.
    fn tid(&self) -> i32;
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }
    /// An address known to lie on the calling thread's stack.
    fn probe_address(&self) -> usize;
}

/// Run the original stack query and repair a zero-size answer.
///
/// Returns [`StackError::Query`] when the original fails and
/// [`StackError::Fatal`] when a zero size is seen on a thread other than the
/// initial one, or when no size source is left to consult.
pub fn repair_stack_bounds<P>(
    platform: &P,
    environ_snapshot: usize,
) -> Result<StackRepair, StackError>
where
    P: StackPlatform + ?Sized,
{
    let mut bounds = platform.attr_stack().map_err(StackError::Query)?;

    if bounds.size != 0 {
        let addr_source = if bounds.addr != 0 {
            AddrSource::Platform
        } else {
            AddrSource::Unknown
        };
        return Ok(StackRepair {
            bounds,
            size_source: SizeSource::Platform,
            addr_source,
        });
    }

    // Only the initial thread's geometry comes from /proc.
    let (pid, tid) = (platform.pid(), platform.tid());
    if pid != tid {
        return Err(FatalError::ZeroStackOnSecondaryThread { pid, tid }.into());
    }

    let size_source = match platform.attr_stacksize() {
        Ok(size) if size != 0 => {
            bounds.size = size;
            SizeSource::AttrStackSize
        }
        _ => {
            let rl = platform
                .stack_rlimit()
                .map_err(|errno| FatalError::StackLimitUnavailable { errno })?;
            bounds.size = rl.soft_as_size();
            SizeSource::ResourceLimit
        }
    };

    let addr_source = if bounds.addr != 0 {
        AddrSource::Platform
    } else {
        let page = effective_page_size(platform.page_size());
        match estimate_stack_base(environ_snapshot, bounds.size, page) {
            Some(base) if contains_probe(base, bounds.size, platform.probe_address()) => {
                bounds.addr = base;
                AddrSource::Estimated
            }
            _ => AddrSource::Unknown,
        }
    };

    Ok(StackRepair {
        bounds,
        size_source,
        addr_source,
    })
}

/// `page` if it is a usable page size, else [`DEFAULT_PAGE_SIZE`].
#[inline]
#[must_use]
pub fn effective_page_size(page: usize) -> usize {
    if page.is_power_of_two() {
        page
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Estimate the lowest stack address from the environment block location.
///
/// The top of the stack is taken as the page boundary just above
/// `environ_addr`. The argument and environment strings sit between the
/// block and the real top, so when they span more than one page the
/// estimate is low by the excess. `None` if the arithmetic leaves the
/// address space.
#[must_use]
pub fn estimate_stack_base(environ_addr: usize, size: usize, page: usize) -> Option<usize> {
    let top = estimate_stack_top(environ_addr, page)?;
    top.checked_sub(size)
}

/// Page boundary immediately above the page containing `environ_addr`.
#[inline]
#[must_use]
pub fn estimate_stack_top(environ_addr: usize, page: usize) -> Option<usize> {
    debug_assert!(page.is_power_of_two());
    (environ_addr & !(page - 1)).checked_add(page)
}

/// `true` if `probe` lies strictly inside `(base, base + size)`.
#[inline]
#[must_use]
pub fn contains_probe(base: usize, size: usize, probe: usize) -> bool {
    probe > base && base.checked_add(size).is_none_or(|end| probe < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn top_rounds_down_then_advances_one_page() {
        assert_eq!(estimate_stack_top(0x7fff_1234, 4096), Some(0x7fff_2000));
        assert_eq!(estimate_stack_top(0x7fff_1000, 4096), Some(0x7fff_2000));
        assert_eq!(estimate_stack_top(0x7fff_1fff, 4096), Some(0x7fff_2000));
    }

    #[test]
    fn base_subtracts_size() {
        assert_eq!(
            estimate_stack_base(0x7fff_0000_1234, 8 * MIB, 4096),
            Some(0x7fff_0000_2000 - 8 * MIB)
        );
    }

    #[test]
    fn base_underflow_is_none() {
        assert_eq!(estimate_stack_base(0x1000, 8 * MIB, 4096), None);
        assert_eq!(estimate_stack_base(0x7fff_0000, usize::MAX, 4096), None);
    }

    #[test]
    fn top_overflow_is_none() {
        assert_eq!(estimate_stack_top(usize::MAX, 4096), None);
    }

    #[test]
    fn probe_must_be_strictly_inside() {
        let base = 0x1000_0000;
        let size = 0x10_0000;
        assert!(contains_probe(base, size, base + 1));
        assert!(contains_probe(base, size, base + size - 1));
        assert!(!contains_probe(base, size, base));
        assert!(!contains_probe(base, size, base + size));
        assert!(!contains_probe(base, size, base - 1));
        assert!(!contains_probe(base, 0, base));
    }

    #[test]
    fn page_size_fallback() {
        assert_eq!(effective_page_size(16384), 16384);
        assert_eq!(effective_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(effective_page_size(5000), DEFAULT_PAGE_SIZE);
    }
}
