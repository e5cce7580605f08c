//! Library-loading veto.
//!
//! The browser probes for GNOME integration with `dlopen()` and, when the
//! libraries exist but their services are not running, shows a dialog.
//! Refusing these loads is the only fix short of rebuilding the browser.

/// Library name prefixes that `dlopen()` refuses to load.
pub const VETOED_PREFIXES: [&[u8]; 2] = [b"libgnomeui", b"libgconf"];

/// Returns `true` if loading `name` must fail without consulting the loader.
#[inline]
#[must_use]
pub fn is_vetoed(name: &[u8]) -> bool {
    VETOED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
