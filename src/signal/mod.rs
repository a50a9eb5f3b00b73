//! SIGINT/SIGTERM handling
//!
//! First signal: cancel the shared [`CancelToken`]. Callers waiting on
//! another caller's population give up; a population already running in
//! this process is allowed to finish so no half-promoted version is left.
//!
//! Second signal: exit immediately with [`EXIT_CODE_CANCELLED`].

use std::process;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use resource_worker::CancelToken;
use tracing::warn;

/// Exit code for cancelled commands
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel waits
    InitiateCancellation,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal
    Ignore,
}

/// Signal handler state
#[derive(Debug)]
pub struct SignalState {
    signal_count: AtomicU8,
    cancel: CancelToken,
}

impl SignalState {
    /// Create a new signal state driving `cancel`.
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            signal_count: AtomicU8::new(0),
            cancel,
        }
    }

    /// Check if cancellation has been requested
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Get the number of signals received
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and return the action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        match count {
            0 => {
                self.cancel.cancel();
                SignalAction::InitiateCancellation
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Installs the process signal handler
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler that cancels `cancel` on the first signal.
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            state: Arc::new(SignalState::new(cancel)),
        }
    }

    /// Get a reference to the signal state
    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the handler. Must be called once at program startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                warn!("received interrupt, cancelling waits (interrupt again to exit now)");
            }
            SignalAction::ImmediateExit => {
                warn!("received second interrupt, exiting");
                process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}
