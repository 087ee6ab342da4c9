//! Cooperative shutdown between the signal handler, the receive thread and
//! the poll loop.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Why the poll loop was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Interrupt or termination signal; a clean exit.
    Interrupted,
    /// The chat connection died underneath us.
    ConnectionLost,
}

/// One-shot stop request shared between the signal handler, the receive
/// thread and the poll loop. The first request wins.
#[derive(Debug, Default)]
pub struct StopSignal {
    reason: Mutex<Option<StopReason>>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, reason: StopReason) {
        let mut guard = self.reason.lock();
        if guard.is_none() {
            tracing::debug!("stop requested: {:?}", reason);
            *guard = Some(reason);
        }
        self.cond.notify_all();
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }

    pub fn is_requested(&self) -> bool {
        self.reason().is_some()
    }

    /// Sleep for `timeout` unless a stop is requested first.
    ///
    /// Returns `true` when stopping.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.reason.lock();
        while guard.is_none() {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        guard.is_some()
    }
}
