// Every export takes raw pointers straight from C callers and mirrors the
// libc contract of the symbol it replaces.
#![allow(clippy::missing_safety_doc)]
//! # torstub-abi
//!
//! `LD_PRELOAD` interposer for a sandboxed browser whose only network path is
//! a pair of Unix sockets bridged to Tor.
//!
//! This crate produces a `cdylib` (`libtorstub.so`) exporting replacements for
//! `connect`, `socket`, `pthread_attr_getstack` and `dlopen`, plus two
//! PulseAudio symbols. Each export consults the state published by the
//! load-time constructor, applies the policy from `torstub-core`, and then
//! either answers directly or delegates to the next definition in link order.
//!
//! # Architecture
//!
//! ```text
//! loader -> .init_array -> bootstrap (env, dlsym(RTLD_NEXT), targets)
//! C caller -> ABI entry (this crate) -> core policy -> original or local answer
//! ```
//!
//! Bootstrap failures and impossible stack states abort the process with a
//! `torstub: ERROR:` line on stderr. Call-level failures surface the way the
//! replaced symbol reports them: `-1` with `errno`, or an error number.

mod macros;

pub mod bootstrap;
pub mod diag;
pub mod dlfcn_abi;
pub mod pthread_abi;
pub mod pulse_abi;
pub mod socket_abi;
pub mod util;
