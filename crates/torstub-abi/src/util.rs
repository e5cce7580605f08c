//! Shared internal utilities for ABI adapters.

use std::ffi::{c_char, c_int};

/// Scan a C string with an optional hard bound.
///
/// Returns `(len, terminated)` where:
/// - `len` is the byte length before the first NUL or before the bound.
/// - `terminated` indicates whether a NUL byte was observed.
///
/// # Safety
///
/// `ptr` must be valid to read up to the discovered length (and bound when given).
pub unsafe fn scan_c_string(ptr: *const c_char, bound: Option<usize>) -> (usize, bool) {
    match bound {
        Some(limit) => {
            for i in 0..limit {
                if unsafe { *ptr.add(i) } == 0 {
                    return (i, true);
                }
            }
            (limit, false)
        }
        None => {
            let mut i = 0usize;
            while unsafe { *ptr.add(i) } != 0 {
                i += 1;
            }
            (i, true)
        }
    }
}

/// Borrow at most `bound` bytes of a C string, excluding the NUL.
///
/// # Safety
///
/// Same contract as [`scan_c_string`]; the returned slice must not outlive
/// the C string.
pub unsafe fn c_str_prefix<'a>(ptr: *const c_char, bound: usize) -> &'a [u8] {
    let (len, _) = unsafe { scan_c_string(ptr, Some(bound)) };
    unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }
}

/// Store `val` in the calling thread's errno.
#[inline]
pub fn set_errno(val: c_int) {
    // SAFETY: `__errno_location` returns this thread's errno slot.
    unsafe { *libc::__errno_location() = val };
}

/// errno left by the last failed libc call, or `default` if none.
#[inline]
pub fn last_errno(default: c_int) -> c_int {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_scan_stops_at_nul() {
        let s = c"libgconf-2.so.4";
        let (len, terminated) = unsafe { scan_c_string(s.as_ptr(), Some(64)) };
        assert_eq!(len, 15);
        assert!(terminated);
    }

    #[test]
    fn bounded_scan_respects_limit() {
        let s = c"libgnomeui-2.so.0";
        let (len, terminated) = unsafe { scan_c_string(s.as_ptr(), Some(4)) };
        assert_eq!(len, 4);
        assert!(!terminated);
        assert_eq!(unsafe { c_str_prefix(s.as_ptr(), 4) }, b"libg");
    }

    #[test]
    fn errno_round_trips() {
        set_errno(libc::EHOSTUNREACH);
        assert_eq!(last_errno(0), libc::EHOSTUNREACH);
    }
}
