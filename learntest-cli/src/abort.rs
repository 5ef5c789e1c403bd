//! Operator Abort
//!
//! SIGINT and SIGTERM set a process-wide flag. Supervisors poll it between
//! wait slices and tear down their process group when it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag set by the signal handler
static ABORT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install SIGINT/SIGTERM handlers that set the abort flag.
/// The handler is async-signal-safe (only sets an atomic).
pub fn install_abort_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = abort_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

extern "C" fn abort_handler(_sig: libc::c_int) {
    ABORT_REQUESTED.store(true, Ordering::Relaxed);
}

/// Abort flag shared by every supervisor of a run.
///
/// Set either by the signal handler or programmatically through
/// [`AbortSignal::request`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    local: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort of the run
    pub fn request(&self) {
        self.local.store(true, Ordering::Relaxed);
    }

    /// Whether an abort was requested
    pub fn is_requested(&self) -> bool {
        self.local.load(Ordering::Relaxed) || ABORT_REQUESTED.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_shared_between_clones() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_requested());
        signal.request();
        assert!(clone.is_requested());
    }
}
