//! Linux errno values surfaced by the interposed calls.

/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Address family not supported by protocol.
pub const EAFNOSUPPORT: i32 = 97;
/// No route to host.
pub const EHOSTUNREACH: i32 = 113;
/// Out of memory.
pub const ENOMEM: i32 = 12;
