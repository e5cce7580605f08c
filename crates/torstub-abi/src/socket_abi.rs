//! ABI layer for `connect()` and `socket()`.
//!
//! Routing decisions come from `torstub_core::socket`; this module owns the
//! raw pointers, the prebuilt `sockaddr_un` targets, and errno.

use std::ffi::c_int;
use std::mem::size_of;

use torstub_core::config::{LocalTarget, SOCKADDR_UN_LEN, StubConfig, TargetKind};
use torstub_core::socket::{
    self as socket_core, AF_LOCAL, ConnectRoute, SOCKADDR_IN_LEN, SOCKADDR_LEN,
};

use crate::bootstrap::{self, ConnectFn, SocketFn};
use crate::macros::abi_fn;
use crate::util::set_errno;

const _: () = assert!(size_of::<libc::sockaddr>() == SOCKADDR_LEN);
const _: () = assert!(size_of::<libc::sockaddr_in>() == SOCKADDR_IN_LEN);
const _: () = assert!(size_of::<libc::sockaddr_un>() == SOCKADDR_UN_LEN);

/// Exact length passed with every redirected connect.
pub const TARGET_ADDR_LEN: libc::socklen_t = size_of::<libc::sockaddr_un>() as libc::socklen_t;

fn sockaddr_un_for(target: &LocalTarget) -> libc::sockaddr_un {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = AF_LOCAL as libc::sa_family_t;
    for (dst, &src) in addr.sun_path.iter_mut().zip(target.sun_path()) {
        *dst = src as libc::c_char;
    }
    addr
}

/// Rewrites outbound connections onto the two local endpoints.
pub struct Redirector {
    connect: ConnectFn,
    socket: SocketFn,
    socks: libc::sockaddr_un,
    control: libc::sockaddr_un,
}

impl Redirector {
    pub fn new(connect: ConnectFn, socket: SocketFn, config: &StubConfig) -> Self {
        Self {
            connect,
            socket,
            socks: sockaddr_un_for(&config.socks),
            control: sockaddr_un_for(&config.control),
        }
    }

    /// Prebuilt address for `kind`.
    #[must_use]
    pub fn target_addr(&self, kind: TargetKind) -> &libc::sockaddr_un {
        match kind {
            TargetKind::Socks => &self.socks,
            TargetKind::Control => &self.control,
        }
    }

    /// Interposed `connect()`.
    ///
    /// # Safety
    ///
    /// `address` must be null or valid for reads of `address_len` bytes.
    pub unsafe fn connect(
        &self,
        fd: c_int,
        address: *const libc::sockaddr,
        address_len: libc::socklen_t,
    ) -> c_int {
        let raw = if address.is_null() {
            None
        } else {
            // SAFETY: caller guarantees `address_len` readable bytes.
            Some(unsafe { std::slice::from_raw_parts(address.cast::<u8>(), address_len as usize) })
        };

        match socket_core::route_connect(raw) {
            Ok(ConnectRoute::Passthrough) => unsafe { (self.connect)(fd, address, address_len) },
            Ok(ConnectRoute::Redirect(kind)) => {
                let target: *const libc::sockaddr_un = self.target_addr(kind);
                unsafe { (self.connect)(fd, target.cast(), TARGET_ADDR_LEN) }
            }
            Err(err) => {
                set_errno(err.errno());
                -1
            }
        }
    }

    /// Interposed `socket()`.
    ///
    /// # Safety
    ///
    /// Calls the original `socket()`; no pointer arguments.
    pub unsafe fn socket(&self, domain: c_int, sock_type: c_int, protocol: c_int) -> c_int {
        match socket_core::socket_domain(domain) {
            Ok(domain) => unsafe { (self.socket)(domain, sock_type, protocol) },
            Err(err) => {
                set_errno(err.errno());
                -1
            }
        }
    }
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

abi_fn! {
    fn connect(fd: c_int, address: *const libc::sockaddr, address_len: libc::socklen_t) -> c_int {
        bootstrap::state().redirector.connect(fd, address, address_len)
    }
}

// ---------------------------------------------------------------------------
// socket
// ---------------------------------------------------------------------------

abi_fn! {
    fn socket(domain: c_int, sock_type: c_int, protocol: c_int) -> c_int {
        bootstrap::state().redirector.socket(domain, sock_type, protocol)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::ffi::OsString;

    use torstub_core::config::{CONTROL_SOCKET_ENV, SOCKS_SOCKET_ENV};

    use super::*;
    use crate::util::last_errno;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ConnectCall {
        fd: c_int,
        family: libc::sa_family_t,
        path: Vec<u8>,
        len: libc::socklen_t,
    }

    thread_local! {
        static CONNECT_CALLS: RefCell<Vec<ConnectCall>> = const { RefCell::new(Vec::new()) };
        static SOCKET_CALLS: RefCell<Vec<(c_int, c_int, c_int)>> = const { RefCell::new(Vec::new()) };
    }

    unsafe extern "C" fn fake_connect(
        fd: c_int,
        addr: *const libc::sockaddr,
        len: libc::socklen_t,
    ) -> c_int {
        let family = unsafe { (*addr).sa_family };
        let path = if i32::from(family) == libc::AF_UNIX {
            let un = unsafe { &*addr.cast::<libc::sockaddr_un>() };
            un.sun_path
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as u8)
                .collect()
        } else {
            Vec::new()
        };
        CONNECT_CALLS.with(|calls| {
            calls.borrow_mut().push(ConnectCall {
                fd,
                family,
                path,
                len,
            })
        });
        0
    }

    unsafe extern "C" fn fake_socket(domain: c_int, ty: c_int, proto: c_int) -> c_int {
        SOCKET_CALLS.with(|calls| calls.borrow_mut().push((domain, ty, proto)));
        77
    }

    fn take_connect_calls() -> Vec<ConnectCall> {
        CONNECT_CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
    }

    fn redirector() -> Redirector {
        let config = StubConfig::from_lookup(
            |key| match key {
                SOCKS_SOCKET_ENV => Some(OsString::from("/tmp/tbb/socks")),
                CONTROL_SOCKET_ENV => Some(OsString::from("/tmp/tbb/control")),
                _ => None,
            },
            0,
        )
        .unwrap();
        Redirector::new(fake_connect, fake_socket, &config)
    }

    fn sockaddr_in(port: u16, ip: [u8; 4]) -> libc::sockaddr_in {
        // SAFETY: plain old data.
        let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_port = port.to_be();
        sin.sin_addr.s_addr = u32::from_ne_bytes(ip);
        sin
    }

    unsafe fn connect_in(r: &Redirector, fd: c_int, sin: &libc::sockaddr_in) -> c_int {
        let ptr: *const libc::sockaddr_in = sin;
        unsafe { r.connect(fd, ptr.cast(), size_of::<libc::sockaddr_in>() as libc::socklen_t) }
    }

    #[test]
    fn socks_ports_delegate_to_socks_target() {
        let r = redirector();
        for port in [9050, 9150] {
            let rc = unsafe { connect_in(&r, 5, &sockaddr_in(port, [93, 184, 216, 34])) };
            assert_eq!(rc, 0);
        }
        let calls = take_connect_calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            assert_eq!(call.fd, 5);
            assert_eq!(i32::from(call.family), libc::AF_UNIX);
            assert_eq!(call.path, b"/tmp/tbb/socks");
            assert_eq!(call.len, TARGET_ADDR_LEN);
        }
    }

    #[test]
    fn control_ports_delegate_to_control_target() {
        let r = redirector();
        for port in [9051, 9151] {
            let rc = unsafe { connect_in(&r, 6, &sockaddr_in(port, [127, 0, 0, 1])) };
            assert_eq!(rc, 0);
        }
        let calls = take_connect_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.path == b"/tmp/tbb/control"));
        assert!(calls.iter().all(|c| c.len == TARGET_ADDR_LEN));
    }

    #[test]
    fn unknown_port_fails_without_delegating() {
        let r = redirector();
        let rc = unsafe { connect_in(&r, 7, &sockaddr_in(443, [93, 184, 216, 34])) };
        assert_eq!(rc, -1);
        assert_eq!(last_errno(0), libc::EHOSTUNREACH);
        assert!(take_connect_calls().is_empty());
    }

    #[test]
    fn null_and_short_addresses_are_invalid() {
        let r = redirector();
        let rc = unsafe { r.connect(3, std::ptr::null(), 16) };
        assert_eq!(rc, -1);
        assert_eq!(last_errno(0), libc::EINVAL);

        let sin = sockaddr_in(9050, [127, 0, 0, 1]);
        let ptr: *const libc::sockaddr_in = &sin;
        let rc = unsafe { r.connect(3, ptr.cast(), 8) };
        assert_eq!(rc, -1);
        assert_eq!(last_errno(0), libc::EINVAL);
        assert!(take_connect_calls().is_empty());
    }

    #[test]
    fn local_address_passes_through_unchanged() {
        let r = redirector();
        let config_target = LocalTarget::new(TargetKind::Socks, b"/run/user/app.sock");
        let un = sockaddr_un_for(&config_target);
        let ptr: *const libc::sockaddr_un = &un;
        let rc = unsafe { r.connect(9, ptr.cast(), 40) };
        assert_eq!(rc, 0);
        let calls = take_connect_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, b"/run/user/app.sock");
        assert_eq!(calls[0].len, 40);
    }

    #[test]
    fn inet6_is_unsupported() {
        let r = redirector();
        // SAFETY: plain old data.
        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sin6.sin6_port = 9050u16.to_be();
        let ptr: *const libc::sockaddr_in6 = &sin6;
        let rc = unsafe {
            r.connect(
                4,
                ptr.cast(),
                size_of::<libc::sockaddr_in6>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, -1);
        assert_eq!(last_errno(0), libc::EAFNOSUPPORT);
        assert!(take_connect_calls().is_empty());
    }

    #[test]
    fn socket_rewrites_inet_and_refuses_others() {
        let r = redirector();
        assert_eq!(unsafe { r.socket(libc::AF_INET, libc::SOCK_STREAM, 0) }, 77);
        assert_eq!(unsafe { r.socket(libc::AF_UNIX, libc::SOCK_DGRAM, 0) }, 77);
        assert_eq!(unsafe { r.socket(libc::AF_INET6, libc::SOCK_STREAM, 0) }, -1);
        assert_eq!(last_errno(0), libc::EAFNOSUPPORT);
        assert_eq!(unsafe { r.socket(libc::AF_NETLINK, libc::SOCK_RAW, 0) }, -1);

        let calls = SOCKET_CALLS.with(|c| std::mem::take(&mut *c.borrow_mut()));
        assert_eq!(
            calls,
            vec![
                (libc::AF_UNIX, libc::SOCK_STREAM, 0),
                (libc::AF_UNIX, libc::SOCK_DGRAM, 0)
            ]
        );
    }

    #[test]
    fn target_addresses_carry_configured_paths() {
        let r = redirector();
        let socks = r.target_addr(TargetKind::Socks);
        assert_eq!(i32::from(socks.sun_family), libc::AF_UNIX);
        let path: Vec<u8> = socks.sun_path[..14].iter().map(|&c| c as u8).collect();
        assert_eq!(path, b"/tmp/tbb/socks");
        assert_eq!(socks.sun_path[14], 0);
    }
}
