//! Ringing for notification-presented calls
//!
//! A [`Ringer`] drives a repeating vibration pattern plus a periodic
//! emphasis pulse until stopped. The pulse runs as a tokio task; stopping
//! cancels the vibrator and aborts that task in one step, so no terminal
//! transition can leave a vibration loop behind.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::call::CallId;
use crate::config::RingConfig;

/// Device vibration motor
pub trait Vibrator: Send + Sync {
    /// Start `pattern_ms` (alternating wait/vibrate), optionally repeating
    fn vibrate_pattern(&self, pattern_ms: &[u64], repeat: bool);

    /// One pulse of `duration`
    fn vibrate_once(&self, duration: Duration);

    /// Stop any vibration
    fn cancel(&self);
}

#[derive(Default)]
struct RingState {
    ringing_for: Option<CallId>,
    pulse: Option<JoinHandle<()>>,
}

/// Vibration loop owner
pub struct Ringer {
    vibrator: Arc<dyn Vibrator>,
    config: RingConfig,
    state: Mutex<RingState>,
}

impl Ringer {
    pub fn new(vibrator: Arc<dyn Vibrator>, config: RingConfig) -> Self {
        Self {
            vibrator,
            config,
            state: Mutex::new(RingState::default()),
        }
    }

    /// Start ringing for `call_id`, replacing any ring already running
    pub fn start(&self, call_id: &CallId) {
        let mut state = self.state.lock();
        self.halt(&mut state);

        self.vibrator
            .vibrate_pattern(&self.config.vibration_pattern_ms, self.config.repeat);

        match Handle::try_current() {
            Ok(handle) => {
                let vibrator = Arc::clone(&self.vibrator);
                let interval = self.config.pulse_interval;
                let pulse = self.config.pulse_duration;
                state.pulse = Some(handle.spawn(async move {
                    let mut ticker = time::interval_at(Instant::now() + interval, interval);
                    loop {
                        ticker.tick().await;
                        vibrator.vibrate_once(pulse);
                    }
                }));
            }
            Err(_) => warn!("No tokio runtime; ringing without emphasis pulse"),
        }

        state.ringing_for = Some(call_id.clone());
        info!(%call_id, "Ringing started");
    }

    /// Stop any ringing; returns whether something was ringing
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        let was_ringing = state.ringing_for.is_some();
        self.halt(&mut state);
        if was_ringing {
            info!("Ringing stopped");
        }
        was_ringing
    }

    /// Stop only if ringing for `call_id`
    pub fn stop_for(&self, call_id: &CallId) -> bool {
        let mut state = self.state.lock();
        if state.ringing_for.as_ref() != Some(call_id) {
            return false;
        }
        self.halt(&mut state);
        debug!(%call_id, "Ringing stopped for call");
        true
    }

    pub fn is_ringing(&self) -> bool {
        self.state.lock().ringing_for.is_some()
    }

    pub fn ringing_for(&self) -> Option<CallId> {
        self.state.lock().ringing_for.clone()
    }

    fn halt(&self, state: &mut RingState) {
        self.vibrator.cancel();
        if let Some(pulse) = state.pulse.take() {
            pulse.abort();
        }
        state.ringing_for = None;
    }
}

impl Drop for Ringer {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(pulse) = state.pulse.take() {
            pulse.abort();
        }
        if state.ringing_for.take().is_some() {
            self.vibrator.cancel();
        }
    }
}

impl fmt::Debug for Ringer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ringer")
            .field("ringing_for", &self.state.lock().ringing_for)
            .finish()
    }
}
