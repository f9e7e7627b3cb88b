//! Requests-per-minute limiter using a sliding window

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window request limiter
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    window: Duration,
    last_requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, Duration::from_secs(60))
    }

    /// Limiter over a custom window
    pub fn with_window(requests: u32, window: Duration) -> Self {
        Self {
            requests_per_minute: requests.max(1),
            window,
            last_requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until a request fits in the window, then record it
    pub async fn acquire(&self) {
        loop {
            // The lock covers bookkeeping only, never the sleep
            let wait = {
                let mut last = self.last_requests.lock().await;
                let now = Instant::now();

                while let Some(&front) = last.front() {
                    if now.duration_since(front) >= self.window {
                        last.pop_front();
                    } else {
                        break;
                    }
                }

                if last.len() < self.requests_per_minute as usize {
                    last.push_back(now);
                    return;
                }

                last.front()
                    .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                    .unwrap_or_default()
                    + Duration::from_millis(10)
            };
            tracing::debug!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window
    pub async fn in_window(&self) -> usize {
        let last = self.last_requests.lock().await;
        let now = Instant::now();
        last.iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(5);

        // Should be able to make 5 requests immediately
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.in_window().await, 5);
    }

    #[tokio::test]
    async fn test_rate_limiter_waits_for_window() {
        let limiter = RateLimiter::with_window(2, Duration::from_millis(100));
        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
