use std::sync::Mutex;
use std::time::Instant;

use tracing::{info, warn};

use crate::types::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    calls_seen: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Stateful gate in front of the LLM service.
///
/// Closed counts failures; once the threshold is hit over a minimum call
/// volume the circuit opens for a cooldown. After the cooldown one probe call
/// is admitted (half-open); its outcome either closes the circuit or re-opens
/// it for a full cooldown.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                calls_seen: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, resolving an expired cooldown to half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.resolve_cooldown(&mut inner);
        inner.state
    }

    /// Ask to make a call. Returns false when the caller must fail fast.
    /// In half-open only a single probe is admitted at a time.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        self.resolve_cooldown(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                info!("Circuit breaker probe succeeded; closing circuit");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.calls_seen = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            _ => {
                inner.consecutive_failures = 0;
                inner.calls_seen = inner.calls_seen.saturating_add(1);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                warn!("Circuit breaker probe failed; re-opening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            CircuitState::Closed => {
                inner.calls_seen = inner.calls_seen.saturating_add(1);
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold
                    && inner.calls_seen >= self.config.min_call_volume
                {
                    warn!(
                        "Circuit breaker opening after {} consecutive failures",
                        inner.consecutive_failures
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    fn resolve_cooldown(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.cooldown {
                    info!("Circuit breaker cooldown elapsed; entering half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = false;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // state stays consistent across a poisoned guard
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(threshold: u32, cooldown_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            min_call_volume: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    #[test]
    fn starts_closed_and_admits_calls() {
        let breaker = CircuitBreaker::new(config(3, 100));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(config(3, 10_000));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(config(3, 10_000));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new(config(2, 20));
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.try_acquire());

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire());
        // Second caller is rejected while the probe is in flight.
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn probe_success_closes_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(config(2, 10));
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.try_acquire());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn below_min_volume_stays_closed() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            min_call_volume: 10,
            cooldown: Duration::from_millis(100),
        });
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
