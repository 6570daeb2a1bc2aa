use std::{sync::Mutex, time::Duration};

use crate::config::BroadcastConfig;

// Success decay of 0.9, kept as an integer ratio so delays stay exact.
const DECAY_NUM: u32 = 9;
const DECAY_DEN: u32 = 10;
const GROWTH_FACTOR: u32 = 2;

/// Snapshot of the adaptive pacing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateState {
    pub current_delay: Duration,
    pub consecutive_failures: u32,
}

/// Adaptive spacing between delivery attempts.
///
/// Doubles the delay on every failed delivery (up to `max_delay`) and decays it
/// by 10% on every success (never below `base_delay`). The state lives for the
/// whole process and is shared by every campaign that runs through the queue.
#[derive(Debug)]
pub struct RateController {
    base_delay: Duration,
    max_delay: Duration,
    state: Mutex<RateState>,
}

impl RateController {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = max_delay.max(base_delay);
        Self {
            base_delay,
            max_delay,
            state: Mutex::new(RateState {
                current_delay: base_delay,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn from_config(cfg: &BroadcastConfig) -> Self {
        Self::new(cfg.base_delay, cfg.max_delay)
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Feed the outcome of one delivery into the controller.
    pub fn observe(&self, success: bool) {
        let mut state = self.lock();
        let before = state.current_delay;
        if success {
            state.consecutive_failures = 0;
            state.current_delay =
                (state.current_delay.saturating_mul(DECAY_NUM) / DECAY_DEN).max(self.base_delay);
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.current_delay = state
                .current_delay
                .saturating_mul(GROWTH_FACTOR)
                .min(self.max_delay);
        }
        if before != state.current_delay {
            tracing::debug!(
                from_ms = before.as_millis() as u64,
                to_ms = state.current_delay.as_millis() as u64,
                consecutive_failures = state.consecutive_failures,
                "broadcast pacing adjusted"
            );
        }
    }

    /// Pause to apply before the next delivery attempt.
    pub fn current_delay(&self) -> Duration {
        self.lock().current_delay
    }

    pub fn snapshot(&self) -> RateState {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateState> {
        // The state is plain data; a panic elsewhere cannot leave it half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
