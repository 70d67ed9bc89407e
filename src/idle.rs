//! Idle-time coroutine driver.
//!
//! Runs on the editing thread between key presses. The script layer owns the
//! coroutines; the driver only asks whether any exist, how long it may wait,
//! and tells the host to resume the ready ones. Background threads wake the
//! driver through a [`WakeEvent`].

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, debug_span, warn};

use crate::settings::IdleSettings;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("script error: {0}")]
    Script(String),
    #[error("script returned {0} where a number was expected")]
    NotANumber(String),
}

/// Capability interface the script layer exposes to the driver.
pub trait CoroutineHost {
    fn has_coroutines(&mut self) -> Result<bool, HostError>;
    /// Seconds the driver may wait before resuming, as fractional seconds.
    fn wait_duration(&mut self) -> Result<f64, HostError>;
    fn resume_coroutines(&mut self) -> Result<(), HostError>;
}

/// Auto-reset event: `set` from any thread, consumed by one waiter.
#[derive(Debug, Default)]
pub struct WakeEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_one();
    }

    /// Consume a pending signal without waiting.
    pub fn take(&self) -> bool {
        std::mem::take(&mut *self.signaled.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait up to `timeout` for a signal and consume it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleState {
    /// No coroutines; block for real input only.
    Disabled,
    /// Coroutines exist; waiting for the timeout or a wake signal.
    Waiting,
    /// Timeout expired or wake signaled; coroutines are about to resume.
    Due,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Nothing to wait for; the caller should block on input.
    Disabled,
    /// A key became available; coroutines were not resumed.
    Input,
    /// Coroutines were resumed. `signaled` tells whether a wake event (rather
    /// than the timeout) ended the wait.
    Resumed { signaled: bool },
}

pub struct IdleDriver<H> {
    host: H,
    event: Arc<WakeEvent>,
    state: IdleState,
    iterations: u32,
    max_timeout: Option<Duration>,
}

impl<H: CoroutineHost> IdleDriver<H> {
    pub fn new(host: H, settings: &IdleSettings) -> Self {
        Self {
            host,
            event: Arc::new(WakeEvent::new()),
            state: IdleState::Waiting,
            iterations: 0,
            max_timeout: settings.max_timeout(),
        }
    }

    /// Start of an input line: re-enable and install a fresh wake event.
    pub fn reset(&mut self) {
        self.state = IdleState::Waiting;
        self.iterations = 0;
        self.event = Arc::new(WakeEvent::new());
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn wake_event(&self) -> Arc<WakeEvent> {
        Arc::clone(&self.event)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// How long the input wait may last before `on_idle`. `None` means wait
    /// for input only.
    pub fn timeout(&mut self) -> Option<Duration> {
        self.iterations += 1;

        if !self.is_enabled() {
            return None;
        }

        let secs = match self.host.wait_duration() {
            Ok(secs) if secs.is_nan() => {
                warn!("coroutine wait duration is NaN");
                return None;
            }
            Ok(secs) => secs,
            Err(e) => {
                warn!(error = %e, "coroutine wait duration failed");
                return None;
            }
        };
        let timeout = duration_from_secs(secs);
        Some(match self.max_timeout {
            Some(max) => timeout.min(max),
            None => timeout,
        })
    }

    pub fn on_idle(&mut self) {
        let _span = debug_span!("resume_coroutines", iterations = self.iterations).entered();
        self.state = IdleState::Due;
        if let Err(e) = self.host.resume_coroutines() {
            warn!(error = %e, "resuming coroutines failed");
        }
        self.state = IdleState::Waiting;
    }

    /// Re-enable a disabled driver if the host now has coroutines.
    pub fn kick(&mut self) {
        if self.state == IdleState::Disabled && self.has_coroutines() {
            debug!("idle driver kicked");
            self.state = IdleState::Waiting;
        }
    }

    /// One scheduling step between key presses.
    pub fn wait_idle(&mut self, key_available: impl Fn() -> bool) -> IdleOutcome {
        let Some(timeout) = self.timeout() else {
            return IdleOutcome::Disabled;
        };
        let signaled = self.event.wait_timeout(timeout);
        if key_available() {
            return IdleOutcome::Input;
        }
        self.on_idle();
        IdleOutcome::Resumed { signaled }
    }

    fn is_enabled(&mut self) -> bool {
        if self.state == IdleState::Disabled {
            return false;
        }
        if !self.has_coroutines() {
            self.state = IdleState::Disabled;
        }
        self.state != IdleState::Disabled
    }

    fn has_coroutines(&mut self) -> bool {
        self.host.has_coroutines().unwrap_or_else(|e| {
            warn!(error = %e, "checking coroutines failed");
            false
        })
    }
}

/// Fractional seconds to whole milliseconds, floored at zero.
fn duration_from_secs(secs: f64) -> Duration {
    if secs > 0.0 {
        Duration::from_millis((secs * 1000.0) as u64)
    } else {
        Duration::ZERO
    }
}
