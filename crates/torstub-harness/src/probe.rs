//! One-shot probes of the interposer's decisions.
//!
//! Each probe runs the same `torstub-core` logic the shared object runs and
//! returns a serializable report, so behavior can be inspected without
//! preloading anything into a browser.

use std::ffi::OsString;

use serde::Serialize;
use torstub_core::socket::{AF_INET, AF_INET6, AF_LOCAL, SOCKADDR_IN_LEN};
use torstub_core::stack::{
    contains_probe, effective_page_size, estimate_stack_base, estimate_stack_top,
};
use torstub_core::{ConnectRoute, FatalError, StubConfig, TargetKind, route_connect, socket_domain};

use crate::error::HarnessError;

/// Parse an address family name (`inet`, `inet6`, `local`/`unix`) or number.
pub fn parse_family(raw: &str) -> Result<i32, HarnessError> {
    match raw.to_ascii_lowercase().as_str() {
        "inet" => Ok(AF_INET),
        "inet6" => Ok(AF_INET6),
        "local" | "unix" => Ok(AF_LOCAL),
        other => other.parse().map_err(|_| HarnessError::InvalidArgument {
            what: "address family",
            value: raw.to_string(),
        }),
    }
}

/// Parse a `0x`-prefixed hexadecimal or plain decimal address.
pub fn parse_address(raw: &str) -> Result<usize, HarnessError> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|_| HarnessError::InvalidArgument {
        what: "address",
        value: raw.to_string(),
    })
}

/// Raw socket-address image as a caller would pass it to `connect()`.
///
/// The buffer is `addr_len` bytes; fields that do not fit are dropped.
#[must_use]
pub fn sockaddr_bytes(family: i32, port: u16, ip: [u8; 4], addr_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; addr_len.max(SOCKADDR_IN_LEN)];
    // sa_family_t is host order; the port is network order.
    buf[0..2].copy_from_slice(&(family as u16).to_ne_bytes());
    buf[2..4].copy_from_slice(&port.to_be_bytes());
    buf[4..8].copy_from_slice(&ip);
    buf.truncate(addr_len);
    buf
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub family: i32,
    pub port: u16,
    pub addr_len: usize,
    /// `passthrough`, `socks`, `control`, or `refused`.
    pub route: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

#[must_use]
pub fn probe_route(family: i32, port: u16, addr_len: usize) -> RouteReport {
    let addr = sockaddr_bytes(family, port, [127, 0, 0, 1], addr_len);
    let (route, errno) = match route_connect(Some(&addr)) {
        Ok(ConnectRoute::Passthrough) => ("passthrough", None),
        Ok(ConnectRoute::Redirect(kind)) => (kind.as_str(), None),
        Err(err) => ("refused", Some(err.errno())),
    };
    RouteReport {
        family,
        port,
        addr_len,
        route,
        errno,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketReport {
    pub requested: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

#[must_use]
pub fn probe_socket(domain: i32) -> SocketReport {
    match socket_domain(domain) {
        Ok(effective) => SocketReport {
            requested: domain,
            effective: Some(effective),
            errno: None,
        },
        Err(err) => SocketReport {
            requested: domain,
            effective: None,
            errno: Some(err.errno()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub env: &'static str,
    pub path: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub socks: TargetReport,
    pub control: TargetReport,
    pub debug: bool,
}

/// Load the configuration the stub would see through `lookup`.
pub fn probe_config<F>(mut lookup: F) -> Result<ConfigReport, FatalError>
where
    F: FnMut(&str) -> Option<OsString>,
{
    let mut seen: Vec<(String, OsString)> = Vec::new();
    let config = StubConfig::from_lookup(
        |key| {
            let value = lookup(key);
            if let Some(v) = &value {
                seen.push((key.to_string(), v.clone()));
            }
            value
        },
        0,
    )?;

    let target = |kind: TargetKind| {
        let local = config.target(kind);
        let original = seen
            .iter()
            .find(|(key, _)| key == kind.env_var())
            .map_or(&[][..], |(_, v)| v.as_encoded_bytes());
        TargetReport {
            env: kind.env_var(),
            path: String::from_utf8_lossy(local.path_bytes()).into_owned(),
            truncated: local.is_truncated_from(original),
        }
    };

    Ok(ConfigReport {
        socks: target(TargetKind::Socks),
        control: target(TargetKind::Control),
        debug: config.debug,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEstimateReport {
    pub environ: String,
    pub size: usize,
    pub probe: String,
    pub page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Whether the estimate would be returned instead of a null address.
    pub accepted: bool,
}

#[must_use]
pub fn probe_stack_estimate(
    environ: usize,
    size: usize,
    probe: usize,
    page: usize,
) -> StackEstimateReport {
    let page = effective_page_size(page);
    let top = estimate_stack_top(environ, page);
    let base = estimate_stack_base(environ, size, page);
    let accepted = base.is_some_and(|b| contains_probe(b, size, probe));
    StackEstimateReport {
        environ: format!("{environ:#x}"),
        size,
        probe: format!("{probe:#x}"),
        page,
        top: top.map(|t| format!("{t:#x}")),
        base: base.map(|b| format!("{b:#x}")),
        accepted,
    }
}
