//! Load-time bootstrap and the process-wide stub state.
//!
//! The constructor registered in `.init_array` builds a [`StubState`] once:
//! configuration from the environment, the original implementations of
//! every interposed symbol, and the prebuilt redirect targets. The state is
//! leaked and never written again, so interposed calls read it without
//! locking. Any failure is fatal: a half-initialized interposer would let
//! the host reach the real network.

use std::ffi::{CStr, OsString, c_char, c_int, c_void};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use torstub_core::{FatalError, StubConfig};

use crate::diag::{self, Level};
use crate::socket_abi::Redirector;

pub type ConnectFn = unsafe extern "C" fn(c_int, *const libc::sockaddr, libc::socklen_t) -> c_int;
pub type SocketFn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
pub type GetStackFn =
    unsafe extern "C" fn(*const libc::pthread_attr_t, *mut *mut c_void, *mut libc::size_t) -> c_int;
pub type DlopenFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;

unsafe extern "C" {
    static environ: *const *const c_char;
}

/// Resolve the next definition of `$name` after this object as `$ty`.
macro_rules! resolve_next {
    ($name:ident, $ty:ty) => {{
        let symbol = concat!(stringify!($name), "\0");
        // SAFETY: `symbol` is a static NUL-terminated string.
        let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr().cast::<c_char>()) };
        if ptr.is_null() {
            Err(FatalError::UnresolvedSymbol {
                symbol: stringify!($name),
                reason: dlerror_message(),
            })
        } else {
            // SAFETY: the symbol is the libc definition with this signature.
            Ok(unsafe { std::mem::transmute::<*mut c_void, $ty>(ptr) })
        }
    }};
}

fn dlerror_message() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated thread-local message.
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        "unknown error".to_string()
    } else {
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}

/// The non-interposed implementations of every overridden symbol.
#[derive(Clone, Copy)]
pub struct Originals {
    pub connect: ConnectFn,
    pub socket: SocketFn,
    pub pthread_attr_getstack: GetStackFn,
    pub dlopen: DlopenFn,
}

impl Originals {
    /// Look every original up with `dlsym(RTLD_NEXT, ..)`.
    pub fn resolve() -> Result<Self, FatalError> {
        Ok(Self {
            connect: resolve_next!(connect, ConnectFn)?,
            socket: resolve_next!(socket, SocketFn)?,
            pthread_attr_getstack: resolve_next!(pthread_attr_getstack, GetStackFn)?,
            dlopen: resolve_next!(dlopen, DlopenFn)?,
        })
    }
}

/// Everything interposed calls consult. Immutable once published.
pub struct StubState {
    pub config: StubConfig,
    pub originals: Originals,
    pub redirector: Redirector,
}

impl StubState {
    fn load() -> Result<Self, FatalError> {
        // Snapshot before the host gets a chance to replace `environ`.
        // SAFETY: reading the pointer value only.
        let environ_snapshot = unsafe { environ } as usize;
        let config = StubConfig::from_lookup(secure_lookup, environ_snapshot)?;
        let originals = Originals::resolve()?;
        diag::set_debug(config.debug);
        let redirector = Redirector::new(originals.connect, originals.socket, &config);
        Ok(Self {
            config,
            originals,
            redirector,
        })
    }
}

/// `secure_getenv` semantics: nothing is visible in secure-execution mode.
fn secure_lookup(key: &str) -> Option<OsString> {
    // SAFETY: getauxval has no preconditions.
    if unsafe { libc::getauxval(libc::AT_SECURE) } != 0 {
        return None;
    }
    std::env::var_os(key)
}

// Bootstrap lifecycle states.
pub const STATE_UNINIT: u8 = 0;
pub const STATE_INITIALIZING: u8 = 1;
pub const STATE_READY: u8 = 2;

/// Write-once slot published through an atomic lifecycle.
///
/// UNINIT -> INITIALIZING -> READY. The winner of the UNINIT transition runs
/// the loader; any other caller that arrives before READY gets
/// [`FatalError::BootstrapReentered`] instead of waiting. A failed load
/// leaves the slot in INITIALIZING.
///
/// Used instead of `OnceLock`: a reentrant call from inside the loader must
/// not block on `OnceLock`'s futex.
pub struct BootCell<T> {
    phase: AtomicU8,
    value: AtomicPtr<T>,
}

impl<T> BootCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(STATE_UNINIT),
            value: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Current lifecycle state.
    pub fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    fn published(&self) -> &T {
        let ptr = self.value.load(Ordering::Acquire);
        // SAFETY: once READY, `value` holds a leaked box that is never freed.
        unsafe { &*ptr }
    }

    /// Return the published value, running `load` if nobody has yet.
    pub fn get_or_init<F>(&self, load: F) -> Result<&T, FatalError>
    where
        F: FnOnce() -> Result<T, FatalError>,
    {
        if self.phase() == STATE_READY {
            return Ok(self.published());
        }

        if self
            .phase
            .compare_exchange(
                STATE_UNINIT,
                STATE_INITIALIZING,
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return if self.phase() == STATE_READY {
                Ok(self.published())
            } else {
                Err(FatalError::BootstrapReentered)
            };
        }

        let ptr = Box::into_raw(Box::new(load()?));
        self.value.store(ptr, Ordering::Release);
        self.phase.store(STATE_READY, Ordering::Release);
        Ok(self.published())
    }
}

impl<T> Default for BootCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

static BOOT: BootCell<StubState> = BootCell::new();

/// Build and publish the state if nobody has yet.
pub fn ensure() -> Result<&'static StubState, FatalError> {
    BOOT.get_or_init(StubState::load)
}

/// The published state; aborts if bootstrap cannot complete.
pub fn state() -> &'static StubState {
    match ensure() {
        Ok(state) => state,
        Err(err) => fatal(&err),
    }
}

/// Print a labeled diagnostic and abort the process.
pub fn fatal(err: &FatalError) -> ! {
    diag::emit(Level::Error, format_args!("{err}"));
    std::process::abort()
}

#[cfg(not(test))]
#[used]
#[unsafe(link_section = ".init_array")]
static TORSTUB_INIT: extern "C" fn() = {
    extern "C" fn torstub_init() {
        let _ = state();
    }
    torstub_init
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originals_resolve_in_test_process() {
        // The test binary links libc, which provides every symbol.
        let originals = Originals::resolve().unwrap();
        let fd = unsafe { (originals.socket)(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        assert!(fd >= 0);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn secure_lookup_reads_environment_when_not_secure() {
        let expected = std::env::var_os("PATH");
        assert_eq!(secure_lookup("PATH"), expected);
    }

    #[test]
    fn first_call_publishes_and_later_calls_take_fast_path() {
        let cell = BootCell::new();
        assert_eq!(cell.phase(), STATE_UNINIT);
        let mut loads = 0;

        let first = cell
            .get_or_init(|| {
                loads += 1;
                Ok(41_u32)
            })
            .unwrap();
        assert_eq!(*first, 41);
        assert_eq!(cell.phase(), STATE_READY);

        let second = cell.get_or_init(|| Ok(7)).unwrap();
        assert_eq!(*second, 41);
        assert!(std::ptr::eq(first, second));
        assert_eq!(loads, 1);
    }

    #[test]
    fn reentry_during_initialization_is_fatal() {
        let cell = BootCell::new();
        let mut inner = None;
        let outer = cell.get_or_init(|| {
            assert_eq!(cell.phase(), STATE_INITIALIZING);
            inner = Some(cell.get_or_init(|| Ok(2_u32)).map(|v| *v));
            Ok(1)
        });
        assert_eq!(inner, Some(Err(FatalError::BootstrapReentered)));
        assert_eq!(outer.map(|v| *v), Ok(1));
    }

    #[test]
    fn failed_load_is_not_retried() {
        let cell: BootCell<u32> = BootCell::new();
        let err = FatalError::MissingEnv {
            var: "TOR_STUB_SOCKS_SOCKET",
        };
        assert_eq!(cell.get_or_init(|| Err(err.clone())), Err(err));
        assert_eq!(cell.phase(), STATE_INITIALIZING);
        assert_eq!(
            cell.get_or_init(|| Ok(3)),
            Err(FatalError::BootstrapReentered)
        );
    }
}
