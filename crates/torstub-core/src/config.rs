//! Process-wide configuration built once at load time.
//!
//! The launcher passes the two endpoint paths through the environment:
//! - `TOR_STUB_SOCKS_SOCKET`: path of the SOCKS endpoint (required).
//! - `TOR_STUB_CONTROL_SOCKET`: path of the control endpoint (required).
//! - `TOR_STUB_DEBUG`: `1|true|yes|on` enables debug trace lines (optional).
//!
//! A [`StubConfig`] is never mutated after it is built.

use std::ffi::OsString;

use crate::error::FatalError;

/// Environment variable holding the SOCKS endpoint path.
pub const SOCKS_SOCKET_ENV: &str = "TOR_STUB_SOCKS_SOCKET";
/// Environment variable holding the control endpoint path.
pub const CONTROL_SOCKET_ENV: &str = "TOR_STUB_CONTROL_SOCKET";
/// Environment variable enabling debug tracing.
pub const DEBUG_ENV: &str = "TOR_STUB_DEBUG";

/// Capacity of `sockaddr_un::sun_path` on Linux.
pub const SUN_PATH_LEN: usize = 108;
/// `size_of::<sockaddr_un>()`: `sa_family_t` followed by `sun_path`.
pub const SOCKADDR_UN_LEN: usize = 2 + SUN_PATH_LEN;

/// Which of the two fixed local endpoints a connection lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Socks,
    Control,
}

impl TargetKind {
    /// Environment variable that supplies this endpoint's path.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Socks => SOCKS_SOCKET_ENV,
            Self::Control => CONTROL_SOCKET_ENV,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socks => "socks",
            Self::Control => "control",
        }
    }
}

/// A fixed local-transport endpoint.
///
/// The path is stored exactly as it will appear in `sun_path`: at most
/// `SUN_PATH_LEN - 1` bytes followed by NUL padding.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalTarget {
    kind: TargetKind,
    path: [u8; SUN_PATH_LEN],
}

impl LocalTarget {
    /// Copy `path` into a fixed buffer, truncating if it does not fit.
    ///
    /// Copying stops at the first NUL in `path`, and the last byte of the
    /// buffer is always NUL.
    #[must_use]
    pub fn new(kind: TargetKind, path: &[u8]) -> Self {
        let mut buf = [0u8; SUN_PATH_LEN];
        let len = path
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(path.len())
            .min(SUN_PATH_LEN - 1);
        buf[..len].copy_from_slice(&path[..len]);
        Self { kind, path: buf }
    }

    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Path bytes before the terminating NUL.
    #[must_use]
    pub fn path_bytes(&self) -> &[u8] {
        let len = self
            .path
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SUN_PATH_LEN);
        &self.path[..len]
    }

    /// The full NUL-padded `sun_path` image.
    #[must_use]
    pub const fn sun_path(&self) -> &[u8; SUN_PATH_LEN] {
        &self.path
    }

    /// Whether the source path had to be shortened to fit.
    #[must_use]
    pub fn is_truncated_from(&self, original: &[u8]) -> bool {
        self.path_bytes().len() < original.len()
    }
}

impl std::fmt::Debug for LocalTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTarget")
            .field("kind", &self.kind)
            .field("path", &String::from_utf8_lossy(self.path_bytes()))
            .finish()
    }
}

/// Everything the interposed calls read after bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubConfig {
    pub socks: LocalTarget,
    pub control: LocalTarget,
    /// Location of the environment block when the stub was loaded. Only
    /// ever used as a number, never dereferenced.
    pub environ_snapshot: usize,
    pub debug: bool,
}

impl StubConfig {
    /// Build the configuration from an environment lookup.
    ///
    /// The SOCKS variable is checked before the control variable, so the
    /// reported [`FatalError::MissingEnv`] is deterministic when both are
    /// absent.
    pub fn from_lookup<F>(mut lookup: F, environ_snapshot: usize) -> Result<Self, FatalError>
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        let socks_path = lookup(SOCKS_SOCKET_ENV).ok_or(FatalError::MissingEnv {
            var: SOCKS_SOCKET_ENV,
        })?;
        let control_path = lookup(CONTROL_SOCKET_ENV).ok_or(FatalError::MissingEnv {
            var: CONTROL_SOCKET_ENV,
        })?;
        let debug = lookup(DEBUG_ENV)
            .and_then(|v| v.into_string().ok())
            .is_some_and(|v| parse_flag(&v));

        Ok(Self {
            socks: LocalTarget::new(TargetKind::Socks, socks_path.as_encoded_bytes()),
            control: LocalTarget::new(TargetKind::Control, control_path.as_encoded_bytes()),
            environ_snapshot,
            debug,
        })
    }

    #[must_use]
    pub const fn target(&self, kind: TargetKind) -> &LocalTarget {
        match kind {
            TargetKind::Socks => &self.socks,
            TargetKind::Control => &self.control,
        }
    }
}

/// Parse a boolean switch (case-insensitive). Unknown values are off.
#[must_use]
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
