use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::types::RateLimitConfig;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct Windows {
    minute: VecDeque<Instant>,
    day: VecDeque<Instant>,
}

/// Sliding-window quota limiter for the LLM API: requests-per-minute and
/// requests-per-day. `acquire` suspends the caller until both windows admit
/// the call; timestamps are process-lifetime state shared by all workers.
pub struct ApiRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl ApiRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Wait until the per-minute and per-day quotas admit one more call,
    /// then consume a slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();
                prune(&mut windows.minute, now, MINUTE);
                prune(&mut windows.day, now, DAY);

                let minute_free = windows.minute.len() < self.config.requests_per_minute as usize;
                let day_free = windows.day.len() < self.config.requests_per_day as usize;

                if minute_free && day_free {
                    windows.minute.push_back(now);
                    windows.day.push_back(now);
                    return;
                }

                // Wait for the oldest entry of whichever window is full to age out.
                let minute_wait = if minute_free {
                    Duration::ZERO
                } else {
                    release_in(&windows.minute, now, MINUTE)
                };
                let day_wait = if day_free {
                    Duration::ZERO
                } else {
                    release_in(&windows.day, now, DAY)
                };
                minute_wait.max(day_wait)
            };

            debug!("API quota exhausted; waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Slots currently consumed in the (minute, day) windows.
    pub async fn usage(&self) -> (usize, usize) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        prune(&mut windows.minute, now, MINUTE);
        prune(&mut windows.day, now, DAY);
        (windows.minute.len(), windows.day.len())
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(&oldest) = window.front() {
        if now.duration_since(oldest) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn release_in(window: &VecDeque<Instant>, now: Instant, span: Duration) -> Duration {
    window
        .front()
        .map(|&oldest| span.saturating_sub(now.duration_since(oldest)))
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_millis(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_calls_under_quota_immediately() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            requests_per_minute: 5,
            requests_per_day: 100,
        });
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.usage().await, (5, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_minute_window_frees() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            requests_per_minute: 2,
            requests_per_day: 100,
        });
        limiter.acquire().await;
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        // With paused time the sleep advances the clock a full window.
        assert!(started.elapsed() >= Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn day_quota_binds_even_when_minute_is_free() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            requests_per_minute: 100,
            requests_per_day: 1,
        });
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_secs(60 * 60));
    }
}
