//! Failure-count circuit breaker guarding persistence and sync calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use inv_core::InventoryError;
use inv_core::config::{env_duration_ms, env_u32};
use inv_telemetry::counters;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

impl CircuitSettings {
    pub fn from_env() -> Self {
        Self {
            failure_threshold: env_u32("BREAKER_THRESHOLD", 5).max(1),
            open_duration: env_duration_ms("BREAKER_COOLDOWN_MS", 30_000),
        }
    }
}

#[derive(Debug)]
enum CircuitState {
    Closed { consecutive_failures: u32 },
    HalfOpen,
    Open { reopen_at: Instant },
}

pub struct CircuitBreaker {
    name: &'static str,
    settings: CircuitSettings,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, settings: CircuitSettings) -> Self {
        Self {
            name,
            settings,
            state: Mutex::new(CircuitState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Fast-fail admission check. While open, callers are rejected until the
    /// cooldown elapses; the first caller after that becomes the half-open
    /// probe and all others keep failing until the probe settles.
    pub fn admit(&self) -> Result<(), InventoryError> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match &*state {
            CircuitState::Closed { .. } => Ok(()),
            CircuitState::HalfOpen => Err(self.open_error()),
            CircuitState::Open { reopen_at } => {
                if Instant::now() < *reopen_at {
                    return Err(self.open_error());
                }
                info!(breaker = self.name, "circuit breaker half-open probe");
                *state = CircuitState::HalfOpen;
                Ok(())
            }
        }
    }

    pub fn on_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match &mut *state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                if *consecutive_failures > 0 {
                    debug!(
                        breaker = self.name,
                        failures = *consecutive_failures,
                        "resetting failure counter"
                    );
                }
                *consecutive_failures = 0;
            }
            CircuitState::HalfOpen | CircuitState::Open { .. } => {
                info!(breaker = self.name, "circuit breaker closed");
                *state = CircuitState::Closed {
                    consecutive_failures: 0,
                };
            }
        }
    }

    pub fn on_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        let should_open = match &mut *state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                *consecutive_failures >= self.settings.failure_threshold
            }
            CircuitState::HalfOpen => true,
            CircuitState::Open { .. } => false,
        };
        if should_open {
            self.open(&mut state);
        }
    }

    /// Runs `op` through the breaker. Only persistence failures count toward
    /// the trip threshold; domain errors pass through untallied.
    pub async fn guard<F, T>(&self, op: F) -> Result<T, InventoryError>
    where
        F: Future<Output = Result<T, InventoryError>>,
    {
        self.admit()?;
        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if matches!(err, InventoryError::Persistence { .. }) {
                    self.on_failure();
                }
                Err(err)
            }
        }
    }

    /// Current state label for the metrics endpoint.
    pub fn state_name(&self) -> &'static str {
        let state = self.state.lock().expect("breaker lock poisoned");
        match &*state {
            CircuitState::Closed { .. } => "closed",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Open { .. } => "open",
        }
    }

    fn open(&self, state: &mut CircuitState) {
        let reopen_at = Instant::now() + self.settings.open_duration;
        *state = CircuitState::Open { reopen_at };
        warn!(
            breaker = self.name,
            reopen_in = ?self.settings.open_duration,
            "circuit breaker opened"
        );
        counters::record_counter(counters::BREAKER_OPENINGS, 1);
    }

    fn open_error(&self) -> InventoryError {
        InventoryError::CircuitOpen {
            name: self.name.to_string(),
        }
    }
}
