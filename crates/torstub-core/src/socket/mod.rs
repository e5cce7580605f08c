//! Connection demultiplexing and socket-domain policy.
//!
//! Pure logic behind the interposed `connect()` and `socket()`. The ABI
//! crate hands in the caller's raw address bytes and acts on the returned
//! decision; nothing here touches a file descriptor.

use crate::config::TargetKind;
use crate::error::CallError;

// ---------------------------------------------------------------------------
// Address families (AF_*)
// ---------------------------------------------------------------------------

/// Unix domain sockets.
pub const AF_UNIX: i32 = 1;
/// POSIX name for `AF_UNIX`.
pub const AF_LOCAL: i32 = AF_UNIX;
/// IPv4 Internet protocols.
pub const AF_INET: i32 = 2;
/// IPv6 Internet protocols.
pub const AF_INET6: i32 = 10;

// ---------------------------------------------------------------------------
// Structure sizes
// ---------------------------------------------------------------------------

/// `size_of::<sockaddr>()`: the generic address header.
pub const SOCKADDR_LEN: usize = 16;
/// `size_of::<sockaddr_in>()`.
pub const SOCKADDR_IN_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Port table
// ---------------------------------------------------------------------------

/// SOCKS port of a system tor daemon.
pub const SYSTEM_SOCKS_PORT: u16 = 9050;
/// Control port of a system tor daemon.
pub const SYSTEM_CONTROL_PORT: u16 = 9051;
/// SOCKS port of the browser-bundled tor.
pub const TBB_SOCKS_PORT: u16 = 9150;
/// Control port of the browser-bundled tor.
pub const TBB_CONTROL_PORT: u16 = 9151;

/// Every port that is redirected, with its destination.
pub const PORT_TABLE: [(u16, TargetKind); 4] = [
    (SYSTEM_SOCKS_PORT, TargetKind::Socks),
    (TBB_SOCKS_PORT, TargetKind::Socks),
    (SYSTEM_CONTROL_PORT, TargetKind::Control),
    (TBB_CONTROL_PORT, TargetKind::Control),
];

// ---------------------------------------------------------------------------
// connect()
// ---------------------------------------------------------------------------

/// What the interposed `connect()` does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRoute {
    /// Already a local-transport address; hand it to the original unchanged.
    Passthrough,
    /// Drop the caller's address and connect to this endpoint instead.
    Redirect(TargetKind),
}

/// Map a destination port (host byte order) to its endpoint.
///
/// The destination address is deliberately ignored: only the port selects
/// the endpoint.
#[inline]
#[must_use]
pub fn target_for_port(port: u16) -> Option<TargetKind> {
    match port {
        SYSTEM_SOCKS_PORT | TBB_SOCKS_PORT => Some(TargetKind::Socks),
        SYSTEM_CONTROL_PORT | TBB_CONTROL_PORT => Some(TargetKind::Control),
        _ => None,
    }
}

/// Read `sa_family` from the start of a raw socket address.
#[inline]
fn family_of(addr: &[u8]) -> i32 {
    i32::from(u16::from_ne_bytes([addr[0], addr[1]]))
}

/// Read `sin_port` from a raw `sockaddr_in`, converting to host order.
#[inline]
fn inet_port_of(addr: &[u8]) -> u16 {
    u16::from_be_bytes([addr[2], addr[3]])
}

/// Decide how to handle `connect(fd, addr, addr.len())`.
///
/// `addr` is `None` when the caller passed a null pointer; otherwise it
/// covers exactly the `address_len` bytes the caller supplied.
pub fn route_connect(addr: Option<&[u8]>) -> Result<ConnectRoute, CallError> {
    let addr = match addr {
        Some(a) if a.len() >= SOCKADDR_LEN => a,
        _ => return Err(CallError::InvalidArgument),
    };

    let family = family_of(addr);
    if family == AF_LOCAL {
        return Ok(ConnectRoute::Passthrough);
    }
    if family != AF_INET || addr.len() < SOCKADDR_IN_LEN {
        return Err(CallError::AddressFamilyNotSupported);
    }

    target_for_port(inet_port_of(addr))
        .map(ConnectRoute::Redirect)
        .ok_or(CallError::HostUnreachable)
}

// ---------------------------------------------------------------------------
// socket()
// ---------------------------------------------------------------------------

/// Domain to pass to the original `socket()`.
///
/// IPv4 is silently replaced by the local transport; every other domain
/// except the local transport itself is refused.
#[inline]
pub fn socket_domain(domain: i32) -> Result<i32, CallError> {
    let domain = if domain == AF_INET { AF_LOCAL } else { domain };
    if domain == AF_LOCAL {
        Ok(domain)
    } else {
        Err(CallError::AddressFamilyNotSupported)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn inet(port: u16, ip: [u8; 4]) -> [u8; SOCKADDR_IN_LEN] {
        let mut buf = [0u8; SOCKADDR_IN_LEN];
        buf[..2].copy_from_slice(&(AF_INET as u16).to_ne_bytes());
        buf[2..4].copy_from_slice(&port.to_be_bytes());
        buf[4..8].copy_from_slice(&ip);
        buf
    }

    fn with_family(family: i32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        buf[..2].copy_from_slice(&(family as u16).to_ne_bytes());
        buf
    }

    // -- connect routing -----------------------------------------------------

    #[test]
    fn socks_ports_redirect_to_socks() {
        for port in [SYSTEM_SOCKS_PORT, TBB_SOCKS_PORT] {
            let addr = inet(port, [93, 184, 216, 34]);
            assert_eq!(
                route_connect(Some(&addr)),
                Ok(ConnectRoute::Redirect(TargetKind::Socks))
            );
        }
    }

    #[test]
    fn control_ports_redirect_to_control() {
        for port in [SYSTEM_CONTROL_PORT, TBB_CONTROL_PORT] {
            let addr = inet(port, [127, 0, 0, 1]);
            assert_eq!(
                route_connect(Some(&addr)),
                Ok(ConnectRoute::Redirect(TargetKind::Control))
            );
        }
    }

    #[test]
    fn destination_ip_is_ignored() {
        for ip in [[0, 0, 0, 0], [10, 1, 2, 3], [255, 255, 255, 255]] {
            assert_eq!(
                route_connect(Some(&inet(9050, ip))),
                Ok(ConnectRoute::Redirect(TargetKind::Socks))
            );
        }
    }

    #[test]
    fn port_is_read_in_network_order() {
        // 9050 = 0x235A; its byte-swapped value 0x5A23 must not match.
        let addr = inet(0x5A23, [127, 0, 0, 1]);
        assert_eq!(route_connect(Some(&addr)), Err(CallError::HostUnreachable));
    }

    #[test]
    fn other_ports_are_unreachable() {
        for port in [0, 80, 443, 9049, 9052, 9149, 9152, u16::MAX] {
            assert_eq!(
                route_connect(Some(&inet(port, [1, 1, 1, 1]))),
                Err(CallError::HostUnreachable),
                "port {port}"
            );
        }
    }

    #[test]
    fn null_or_short_address_is_invalid() {
        assert_eq!(route_connect(None), Err(CallError::InvalidArgument));
        let short = with_family(AF_INET, SOCKADDR_LEN - 1);
        assert_eq!(route_connect(Some(&short)), Err(CallError::InvalidArgument));
        assert_eq!(route_connect(Some(&[])), Err(CallError::InvalidArgument));
    }

    #[test]
    fn local_family_passes_through() {
        let addr = with_family(AF_LOCAL, 110);
        assert_eq!(route_connect(Some(&addr)), Ok(ConnectRoute::Passthrough));
        let header_only = with_family(AF_LOCAL, SOCKADDR_LEN);
        assert_eq!(
            route_connect(Some(&header_only)),
            Ok(ConnectRoute::Passthrough)
        );
    }

    #[test]
    fn other_families_are_unsupported() {
        for family in [0, AF_INET6, 16, 17] {
            let addr = with_family(family, 28);
            assert_eq!(
                route_connect(Some(&addr)),
                Err(CallError::AddressFamilyNotSupported),
                "family {family}"
            );
        }
    }

    #[test]
    fn port_table_matches_router() {
        for (port, kind) in PORT_TABLE {
            assert_eq!(target_for_port(port), Some(kind));
        }
    }

    // -- socket domain -------------------------------------------------------

    #[test]
    fn inet_becomes_local() {
        assert_eq!(socket_domain(AF_INET), Ok(AF_LOCAL));
        assert_eq!(socket_domain(AF_INET), socket_domain(AF_LOCAL));
    }

    #[test]
    fn other_domains_refused() {
        for domain in [0, AF_INET6, 16, 17, -1, i32::MAX] {
            assert_eq!(
                socket_domain(domain),
                Err(CallError::AddressFamilyNotSupported),
                "domain {domain}"
            );
        }
    }
}
