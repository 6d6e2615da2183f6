//! Circuit breaker (§3, §4.4). Per-provider-binding state shared across
//! calls and serialized behind a mutex (§5 shared-resource policy).

use crate::errors::ErrorKind;
use crate::model::CircuitBreakerConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    last_failure_time: Option<Instant>,
    failure_timestamps: VecDeque<Instant>,
    /// Set while a HALF_OPEN probe invocation is outstanding so a second
    /// concurrent attempt does not also treat itself as the probe.
    probe_in_flight: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            last_failure_time: None,
            failure_timestamps: VecDeque::new(),
            probe_in_flight: false,
        }
    }
}

/// What the retry engine should do before an invoke, per §4.4.
pub enum Admission {
    /// Invoke freely; this is not a constrained probe.
    Allow,
    /// Invoke exactly once as the HALF_OPEN probe; call
    /// [`CircuitBreaker::on_success`]/`on_failure` with `is_probe = true`.
    AllowProbe,
    /// Refuse the invoke outright; surface `circuit_open`.
    Refuse,
}

/// Keyed by an opaque binding identifier (the router's `ProviderBinding`
/// variant name, or a provider-specific string if finer granularity is
/// wanted) so HTTP providers and the CLI proxy trip independently.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Inner>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Consults (and may transition) the named breaker's state. Called
    /// immediately before every invoke.
    pub fn admit(&self, key: &str, config: &CircuitBreakerConfig) -> Admission {
        let mut breakers = self.breakers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let inner = breakers.entry(key.to_string()).or_insert_with(Inner::new);
        prune_window(&mut inner.failure_timestamps, Duration::from_secs_f64(config.failure_window_s));

        match inner.state {
            BreakerState::Closed => Admission::Allow,
            BreakerState::Open => {
                let elapsed = inner.last_failure_time.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed < Duration::from_secs_f64(config.recovery_timeout_s) {
                    Admission::Refuse
                } else if inner.probe_in_flight {
                    // Another attempt already holds the probe slot.
                    Admission::Refuse
                } else {
                    debug!(key, "circuit breaker recovery timeout elapsed, transitioning to half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Admission::AllowProbe
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Refuse
                } else {
                    inner.probe_in_flight = true;
                    Admission::AllowProbe
                }
            }
        }
    }

    /// A probe or regular invoke succeeded.
    pub fn on_success(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(inner) = breakers.get_mut(key) {
            inner.state = BreakerState::Closed;
            inner.probe_in_flight = false;
            inner.failure_timestamps.clear();
        }
    }

    /// An invoke failed with the given error kind. Errors in
    /// `excluded_error_kinds` do not count toward the window or trip the
    /// breaker, but a failed HALF_OPEN probe still reopens it regardless of
    /// kind (§4.4: "on failure → OPEN").
    pub fn on_failure(&self, key: &str, kind: ErrorKind, config: &CircuitBreakerConfig) {
        let mut breakers = self.breakers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let inner = breakers.entry(key.to_string()).or_insert_with(Inner::new);
        let now = Instant::now();

        if inner.state == BreakerState::HalfOpen {
            warn!(key, "circuit breaker half-open probe failed, reopening");
            inner.state = BreakerState::Open;
            inner.last_failure_time = Some(now);
            inner.probe_in_flight = false;
            return;
        }

        let excluded = config.excluded_error_kinds.iter().any(|k| k == kind.to_string().as_str());
        if excluded {
            return;
        }

        inner.failure_timestamps.push_back(now);
        prune_window(&mut inner.failure_timestamps, Duration::from_secs_f64(config.failure_window_s));

        if inner.failure_timestamps.len() as u32 >= config.failure_threshold {
            warn!(key, count = inner.failure_timestamps.len(), "circuit breaker tripping open");
            inner.state = BreakerState::Open;
            inner.last_failure_time = Some(now);
        }
    }

    pub fn state_of(&self, key: &str) -> BreakerState {
        let breakers = self.breakers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        breakers.get(key).map_or(BreakerState::Closed, |i| i.state)
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_window(timestamps: &mut VecDeque<Instant>, window: Duration) {
    let now = Instant::now();
    while let Some(front) = timestamps.front() {
        if now.duration_since(*front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests;
