//! ABI layer for `dlopen()`.
//!
//! GNOME UI and GConf pull in D-Bus and their own sockets. Refuse them here
//! and let the host fall back to its plain GTK paths.

use std::ffi::{c_char, c_int, c_void};

use torstub_core::dlfcn as dlfcn_core;

use crate::bootstrap::{self, DlopenFn};
use crate::macros::{abi_fn, diag_debug};
use crate::util::c_str_prefix;

/// Bound on the bytes inspected when matching a vetoed name.
const NAME_SCAN_BOUND: usize = 4096;

/// `dlopen()` with the loader veto applied before delegating to `real`.
///
/// # Safety
///
/// `filename` must be null or a NUL-terminated string.
pub unsafe fn dlopen_with(real: DlopenFn, filename: *const c_char, flags: c_int) -> *mut c_void {
    if filename.is_null() {
        return unsafe { real(filename, flags) };
    }

    let name = unsafe { c_str_prefix(filename, NAME_SCAN_BOUND) };
    if dlfcn_core::is_vetoed(name) {
        diag_debug!("dlopen('{}', {flags}) refused", name.escape_ascii());
        return std::ptr::null_mut();
    }
    let handle = unsafe { real(filename, flags) };
    diag_debug!("dlopen('{}', {flags}) = {handle:p}", name.escape_ascii());
    handle
}

abi_fn! {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void {
        dlopen_with(bootstrap::state().originals.dlopen, filename, flags)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    thread_local! {
        static OPENS: Cell<usize> = const { Cell::new(0) };
    }

    const HANDLE: usize = 0x5000;

    unsafe extern "C" fn counting_dlopen(_filename: *const c_char, _flags: c_int) -> *mut c_void {
        OPENS.with(|c| c.set(c.get() + 1));
        HANDLE as *mut c_void
    }

    fn open(name: Option<&std::ffi::CStr>) -> (usize, usize) {
        OPENS.with(|c| c.set(0));
        let ptr = name.map_or(std::ptr::null(), std::ffi::CStr::as_ptr);
        let handle = unsafe { dlopen_with(counting_dlopen, ptr, libc::RTLD_NOW) };
        (handle as usize, OPENS.with(Cell::get))
    }

    #[test]
    fn gnome_and_gconf_are_refused() {
        assert_eq!(open(Some(c"libgnomeui-2.so.0")), (0, 0));
        assert_eq!(open(Some(c"libgconf-2.so.4")), (0, 0));
    }

    #[test]
    fn other_libraries_are_delegated() {
        assert_eq!(open(Some(c"libgtk-3.so.0")), (HANDLE, 1));
        // Only the leading prefix is matched.
        assert_eq!(open(Some(c"/usr/lib/libgconf-2.so.4")), (HANDLE, 1));
    }

    #[test]
    fn null_filename_is_delegated() {
        assert_eq!(open(None), (HANDLE, 1));
    }
}
