// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-state circuit breaker in front of the provider.
//!
//! `closed → open → half-open → closed`. Only provider-origin faults count
//! toward the failure threshold; the caller is responsible for filtering
//! (see `GatewayError::counts_for_breaker`).

use parking_lot::Mutex;
use pw_core::Clock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { since_ms: u64 },
    HalfOpen,
}

/// Read-only view for status endpoints and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSnapshot {
    Closed { consecutive_failures: u32 },
    Open { remaining_secs: u64 },
    HalfOpen,
}

/// Process-wide breaker; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<State>>,
    failure_threshold: u32,
    cooldown_ms: u64,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Closed {
                consecutive_failures: 0,
            })),
            failure_threshold,
            cooldown_ms: cooldown_seconds * 1_000,
            clock,
        }
    }

    /// Gate a call. `Ok` admits it (moving open→half-open once the
    /// cooldown has elapsed); `Err` carries the remaining cooldown.
    pub fn admit(&self) -> Result<(), u64> {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } | State::HalfOpen => Ok(()),
            State::Open { since_ms } => {
                let elapsed = now.saturating_sub(since_ms);
                if elapsed >= self.cooldown_ms {
                    *state = State::HalfOpen;
                    Ok(())
                } else {
                    let remaining_ms = self.cooldown_ms - elapsed;
                    Err(remaining_ms.div_ceil(1_000))
                }
            }
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, State::Closed { consecutive_failures: 0 }) {
            tracing::info!("provider circuit closed");
        }
        *state = State::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a provider-origin failure.
    pub fn record_failure(&self) {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        *state = match *state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    tracing::warn!(failures, "provider circuit opened");
                    State::Open { since_ms: now }
                } else {
                    State::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            // The half-open trial failed: re-open with a fresh stamp.
            State::HalfOpen => {
                tracing::warn!("provider circuit re-opened after half-open trial");
                State::Open { since_ms: now }
            }
            State::Open { .. } => State::Open { since_ms: now },
        };
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.epoch_ms();
        match *self.state.lock() {
            State::Closed {
                consecutive_failures,
            } => BreakerSnapshot::Closed {
                consecutive_failures,
            },
            State::HalfOpen => BreakerSnapshot::HalfOpen,
            State::Open { since_ms } => {
                let elapsed = now.saturating_sub(since_ms);
                BreakerSnapshot::Open {
                    remaining_secs: self.cooldown_ms.saturating_sub(elapsed).div_ceil(1_000),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
