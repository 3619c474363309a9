//! Shared server state and per-IP rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use praxis_engine::storage::InMemoryStorage;
use praxis_engine::WorkflowEngine;
use tokio::sync::Mutex;

/// One client's current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

#[derive(Debug)]
struct Windows {
    by_ip: HashMap<IpAddr, Window>,
    last_sweep: Instant,
}

/// Fixed-window request budget per client IP.
///
/// Expired windows are swept at most once per window length, so idle
/// clients do not accumulate.
pub(crate) struct RateLimiter {
    windows: Mutex<Windows>,
    window: Duration,
    pub(crate) max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            windows: Mutex::new(Windows {
                by_ip: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            window,
            max_requests,
        }
    }

    /// Count one request from `ip`. `Err` carries the seconds until the
    /// client's window resets.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        if now.duration_since(windows.last_sweep) >= self.window {
            let window = self.window;
            windows
                .by_ip
                .retain(|_, w| now.duration_since(w.started) < window);
            windows.last_sweep = now;
        }

        let current = windows.by_ip.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(current.started) >= self.window {
            *current = Window {
                started: now,
                count: 0,
            };
        }
        if current.count >= self.max_requests {
            let left = self.window.saturating_sub(now.duration_since(current.started));
            return Err(left.as_secs().max(1));
        }
        current.count += 1;
        Ok(())
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.by_ip.len()
    }
}

pub(crate) struct AppState {
    pub(crate) engine: WorkflowEngine<InMemoryStorage>,
    pub(crate) rate_limiter: RateLimiter,
    /// Required on every route except /health when set.
    pub(crate) api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn budget_is_per_ip() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check(ip(1)).await.is_ok());
        assert!(limiter.check(ip(1)).await.is_ok());
        let retry = limiter.check(ip(1)).await.unwrap_err();
        assert!((1..=60).contains(&retry));
        assert!(limiter.check(ip(2)).await.is_ok());
    }

    #[tokio::test]
    async fn idle_clients_are_swept() {
        let limiter = RateLimiter::new(5, Duration::from_millis(50));
        for last in 1..=20 {
            limiter.check(ip(last)).await.unwrap();
        }
        assert_eq!(limiter.tracked_clients().await, 20);

        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.check(ip(200)).await.unwrap();
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test]
    async fn expired_window_restores_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.check(ip(1)).await.unwrap();
        assert!(limiter.check(ip(1)).await.is_err());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check(ip(1)).await.is_ok());
    }
}
