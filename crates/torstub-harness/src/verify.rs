//! Behavioral property suite for the interposer's decision logic.
//!
//! Every check runs the pure `torstub-core` functions the shared object
//! calls, over sweeps and scripted platforms, and records a
//! [`VerificationResult`]. `harness verify` prints these as JSONL.

use std::ffi::OsString;
use std::io::Write;

use serde::Serialize;
use torstub_core::resource::{RLIM_INFINITY, Rlimit};
use torstub_core::socket::{AF_INET, AF_INET6, AF_LOCAL, PORT_TABLE, SOCKADDR_LEN};
use torstub_core::stack::{AddrSource, SizeSource};
use torstub_core::{
    CallError, ConnectRoute, FatalError, StackBounds, StackPlatform, StubConfig, TargetKind,
    repair_stack_bounds, route_connect, socket_domain,
};

use crate::error::HarnessError;
use crate::probe::sockaddr_bytes;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Result of one property check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub check: &'static str,
    pub symbol: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

type CheckFn = fn() -> Result<(), String>;

const CHECKS: &[(&str, &str, CheckFn)] = &[
    ("socks_ports_redirect", "connect", socks_ports_redirect),
    ("control_ports_redirect", "connect", control_ports_redirect),
    ("other_ports_unreachable", "connect", other_ports_unreachable),
    ("null_or_short_address_invalid", "connect", null_or_short_address_invalid),
    ("local_address_passthrough", "connect", local_address_passthrough),
    ("inet_matches_local", "socket", inet_matches_local),
    ("other_domains_refused", "socket", other_domains_refused),
    ("nonzero_size_untouched", "pthread_attr_getstack", nonzero_size_untouched),
    ("zero_size_uses_rlimit", "pthread_attr_getstack", zero_size_uses_rlimit),
    ("estimate_needs_live_probe", "pthread_attr_getstack", estimate_needs_live_probe),
    ("missing_socks_env_is_fatal", "bootstrap", missing_socks_env_is_fatal),
    ("missing_control_env_is_fatal", "bootstrap", missing_control_env_is_fatal),
];

/// Run every check in a fixed order.
#[must_use]
pub fn run_suite() -> Vec<VerificationResult> {
    CHECKS
        .iter()
        .map(|&(check, symbol, f)| {
            let outcome = f();
            VerificationResult {
                check,
                symbol,
                passed: outcome.is_ok(),
                detail: outcome.err(),
            }
        })
        .collect()
}

/// Write one JSONL record per result, bracketed by start and summary events.
pub fn emit_results<W: Write>(
    results: &[VerificationResult],
    emitter: &mut LogEmitter<W>,
) -> std::io::Result<()> {
    emitter.emit(LogLevel::Info, "verify_start")?;
    for result in results {
        let (level, outcome) = if result.passed {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        let mut entry = LogEntry::new("", level, result.check)
            .with_symbol(result.symbol)
            .with_outcome(outcome);
        if let Some(detail) = &result.detail {
            entry = entry.with_details(serde_json::json!({ "detail": detail }));
        }
        emitter.emit_entry(entry)?;
    }
    let failed = results.iter().filter(|r| !r.passed).count();
    let summary = LogEntry::new("", LogLevel::Info, "verify_summary").with_details(
        serde_json::json!({ "total": results.len(), "failed": failed }),
    );
    emitter.emit_entry(summary)?;
    emitter.flush()
}

/// `Err` if any check failed.
pub fn require_all_passed(results: &[VerificationResult]) -> Result<(), HarnessError> {
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(HarnessError::VerificationFailed {
            failed,
            total: results.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// connect()
// ---------------------------------------------------------------------------

const SAMPLE_IPS: [[u8; 4]; 4] = [[0, 0, 0, 0], [127, 0, 0, 1], [93, 184, 216, 34], [255; 4]];

fn expect_redirect(kind: TargetKind) -> Result<(), String> {
    for &(port, _) in PORT_TABLE.iter().filter(|(_, k)| *k == kind) {
        for ip in SAMPLE_IPS {
            let addr = sockaddr_bytes(AF_INET, port, ip, 16);
            let got = route_connect(Some(&addr));
            if got != Ok(ConnectRoute::Redirect(kind)) {
                return Err(format!("port {port} ip {ip:?}: {got:?}"));
            }
        }
    }
    Ok(())
}

fn socks_ports_redirect() -> Result<(), String> {
    expect_redirect(TargetKind::Socks)
}

fn control_ports_redirect() -> Result<(), String> {
    expect_redirect(TargetKind::Control)
}

fn other_ports_unreachable() -> Result<(), String> {
    for port in 0..=u16::MAX {
        if PORT_TABLE.iter().any(|&(p, _)| p == port) {
            continue;
        }
        let addr = sockaddr_bytes(AF_INET, port, [127, 0, 0, 1], 16);
        let got = route_connect(Some(&addr));
        if got != Err(CallError::HostUnreachable) {
            return Err(format!("port {port}: {got:?}"));
        }
    }
    Ok(())
}

fn null_or_short_address_invalid() -> Result<(), String> {
    if route_connect(None) != Err(CallError::InvalidArgument) {
        return Err("null address accepted".to_string());
    }
    for len in 0..SOCKADDR_LEN {
        let addr = sockaddr_bytes(AF_INET, 9050, [127, 0, 0, 1], len);
        let got = route_connect(Some(&addr));
        if got != Err(CallError::InvalidArgument) {
            return Err(format!("length {len}: {got:?}"));
        }
    }
    Ok(())
}

fn local_address_passthrough() -> Result<(), String> {
    let addr = sockaddr_bytes(AF_LOCAL, 0, [0; 4], 110);
    match route_connect(Some(&addr)) {
        Ok(ConnectRoute::Passthrough) => Ok(()),
        got => Err(format!("{got:?}")),
    }
}

// ---------------------------------------------------------------------------
// socket()
// ---------------------------------------------------------------------------

fn inet_matches_local() -> Result<(), String> {
    let inet = socket_domain(AF_INET);
    let local = socket_domain(AF_LOCAL);
    if inet == local && local == Ok(AF_LOCAL) {
        Ok(())
    } else {
        Err(format!("inet {inet:?} local {local:?}"))
    }
}

fn other_domains_refused() -> Result<(), String> {
    for domain in (-1..=64).chain([AF_INET6, i32::MAX, i32::MIN]) {
        if domain == AF_INET || domain == AF_LOCAL {
            continue;
        }
        let got = socket_domain(domain);
        if got != Err(CallError::AddressFamilyNotSupported) {
            return Err(format!("domain {domain}: {got:?}"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// pthread_attr_getstack()
// ---------------------------------------------------------------------------

const ENVIRON: usize = 0x7ffd_4000_0a10;
const STACK_TOP: usize = 0x7ffd_4000_1000;

/// Initial-thread platform whose original query reports `bounds`.
struct ScriptedStack {
    bounds: StackBounds,
    stacksize: usize,
    rlimit_cur: u64,
    probe: usize,
}

impl ScriptedStack {
    fn zero_size(rlimit_cur: u64) -> Self {
        Self {
            bounds: StackBounds::default(),
            stacksize: 0,
            rlimit_cur,
            probe: STACK_TOP - 0x2000,
        }
    }
}

impl StackPlatform for ScriptedStack {
    fn attr_stack(&self) -> Result<StackBounds, i32> {
        Ok(self.bounds)
    }

    fn attr_stacksize(&self) -> Result<usize, i32> {
        Ok(self.stacksize)
    }

    fn stack_rlimit(&self) -> Result<Rlimit, i32> {
        Ok(Rlimit {
            rlim_cur: self.rlimit_cur,
            rlim_max: RLIM_INFINITY,
        })
    }

    fn pid(&self) -> i32 {
        100
    }

    fn tid(&self) -> i32 {
        100
    }

    fn probe_address(&self) -> usize {
        self.probe
    }
}

fn nonzero_size_untouched() -> Result<(), String> {
    for bounds in [
        StackBounds {
            addr: 0x7f12_3400_0000,
            size: 8 << 20,
        },
        StackBounds { addr: 0, size: 1 },
    ] {
        let platform = ScriptedStack {
            bounds,
            ..ScriptedStack::zero_size(0)
        };
        let repair = repair_stack_bounds(&platform, ENVIRON).map_err(|e| e.to_string())?;
        if repair.bounds != bounds || repair.size_source != SizeSource::Platform {
            return Err(format!("{bounds:?} became {repair:?}"));
        }
    }
    Ok(())
}

fn zero_size_uses_rlimit() -> Result<(), String> {
    for n in [8u64 << 20, 16 << 20, (1 << 20) + 4096, 1] {
        let platform = ScriptedStack::zero_size(n);
        let repair = repair_stack_bounds(&platform, ENVIRON).map_err(|e| e.to_string())?;
        if repair.bounds.size as u64 != n || repair.size_source != SizeSource::ResourceLimit {
            return Err(format!("rlimit {n}: {repair:?}"));
        }
    }
    Ok(())
}

fn estimate_needs_live_probe() -> Result<(), String> {
    let size = 8usize << 20;
    let base = STACK_TOP - size;
    for probe in [0, base, base - 1, STACK_TOP, STACK_TOP + 0x1000] {
        let platform = ScriptedStack {
            probe,
            ..ScriptedStack::zero_size(size as u64)
        };
        let repair = repair_stack_bounds(&platform, ENVIRON).map_err(|e| e.to_string())?;
        if repair.bounds.addr != 0 || repair.addr_source != AddrSource::Unknown {
            return Err(format!("probe {probe:#x} accepted: {repair:?}"));
        }
    }

    let live = ScriptedStack::zero_size(size as u64);
    let repair = repair_stack_bounds(&live, ENVIRON).map_err(|e| e.to_string())?;
    if repair.bounds.addr != base {
        return Err(format!("live probe rejected: {repair:?}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn expect_missing(present: &[&str], missing: &'static str) -> Result<(), String> {
    let lookup = |key: &str| {
        present
            .iter()
            .any(|p| *p == key)
            .then(|| OsString::from(format!("/run/{key}")))
    };
    match StubConfig::from_lookup(lookup, 0) {
        Err(FatalError::MissingEnv { var }) if var == missing => Ok(()),
        other => Err(format!("expected {missing} missing, got {other:?}")),
    }
}

fn missing_socks_env_is_fatal() -> Result<(), String> {
    expect_missing(&[], "TOR_STUB_SOCKS_SOCKET")?;
    expect_missing(&["TOR_STUB_CONTROL_SOCKET"], "TOR_STUB_SOCKS_SOCKET")
}

fn missing_control_env_is_fatal() -> Result<(), String> {
    expect_missing(&["TOR_STUB_SOCKS_SOCKET"], "TOR_STUB_CONTROL_SOCKET")
}
