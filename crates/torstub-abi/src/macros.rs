//! Helper macros for interposed symbol generation.
//!
//! `abi_fn!` emits `#[unsafe(no_mangle)] pub unsafe extern "C" fn` exports.
//! The `diag_*!` macros format a diagnostic line without allocating.

/// Generate an exported `extern "C"` function that shadows a libc symbol.
///
/// # Usage
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn my_func(arg1: Type1, arg2: Type2) -> ReturnType {
///         // implementation body
///     }
/// }
/// ```
///
/// Exports are compiled out of test builds: a `#[no_mangle] connect` in the
/// unit-test binary would replace the test harness's own libc `connect`.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg(not(test))]
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };
}

/// Emit a debug line (only when `TOR_STUB_DEBUG` is on).
macro_rules! diag_debug {
    ($($arg:tt)*) => {
        $crate::diag::emit($crate::diag::Level::Debug, format_args!($($arg)*))
    };
}

/// Emit a warning line.
macro_rules! diag_warn {
    ($($arg:tt)*) => {
        $crate::diag::emit($crate::diag::Level::Warn, format_args!($($arg)*))
    };
}

pub(crate) use abi_fn;
pub(crate) use diag_debug;
pub(crate) use diag_warn;
