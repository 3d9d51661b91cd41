//! Per-run state machine
//!
//! One atomic state field drives cancellation and protection:
//!
//! ```text
//! NotStarted -> Running -> Protected -> Completed
//!      |           |           |
//!      +-----------+-----------+--> Cancelled (Protected only via force)
//!                  +-----------+--> Failed
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::ConversionState;
use crate::error::ConversionError;
use crate::events::ConversionResult;

pub(super) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct RunControl {
    pub id: u64,
    state: AtomicU8,
    result: OnceLock<Arc<ConversionResult>>,
    error: OnceLock<ConversionError>,
    done: Mutex<bool>,
    done_cv: Condvar,
}

impl RunControl {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConversionState::NotStarted as u8),
            result: OnceLock::new(),
            error: OnceLock::new(),
            done: Mutex::new(false),
            done_cv: Condvar::new(),
        }
    }

    pub fn state(&self) -> ConversionState {
        ConversionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ConversionState::Cancelled
    }

    /// Atomically move `from -> to`; false if the state was something else
    pub fn transition(&self, from: ConversionState, to: ConversionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Cooperative cancel: only honored before the run is protected
    pub fn cancel(&self) -> bool {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                match ConversionState::from_u8(s) {
                    ConversionState::NotStarted | ConversionState::Running => {
                        Some(ConversionState::Cancelled as u8)
                    }
                    _ => None,
                }
            });
        match prev {
            Ok(_) => {
                debug!(run = self.id, "cancel accepted");
                true
            }
            Err(s) => {
                debug!(run = self.id, state = %ConversionState::from_u8(s), "cancel ignored");
                false
            }
        }
    }

    /// Unconditional cancel, including mid-scan
    pub fn force_cancel(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if ConversionState::from_u8(s).is_terminal() {
                    None
                } else {
                    Some(ConversionState::Cancelled as u8)
                }
            })
            .is_ok()
    }

    /// Record a terminal outcome, wake waiters and return the final state
    ///
    /// The result is stored before the state flips to Completed, so a reader
    /// that observes Completed always finds it.
    pub fn finish(
        &self,
        outcome: Result<Option<Arc<ConversionResult>>, ConversionError>,
    ) -> ConversionState {
        match outcome {
            Ok(Some(result)) => {
                let _ = self.result.set(result);
                let _ = self
                    .state
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                        match ConversionState::from_u8(s) {
                            ConversionState::Running | ConversionState::Protected => {
                                Some(ConversionState::Completed as u8)
                            }
                            _ => None,
                        }
                    });
            }
            Ok(None) => {
                self.force_cancel();
            }
            Err(e) => {
                let _ = self.error.set(e);
                let _ = self
                    .state
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                        (!ConversionState::from_u8(s).is_terminal())
                            .then_some(ConversionState::Failed as u8)
                    });
            }
        }

        let mut done = lock(&self.done);
        *done = true;
        self.done_cv.notify_all();
        self.state()
    }

    pub fn result(&self) -> Option<Arc<ConversionResult>> {
        self.result.get().cloned()
    }

    pub fn error(&self) -> Option<ConversionError> {
        self.error.get().cloned()
    }

    /// Block until finished or `timeout` elapses; true if finished
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.done);
        let (guard, _) = self
            .done_cv
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
