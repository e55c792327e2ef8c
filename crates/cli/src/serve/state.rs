//! Shared server state and per-IP rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use rideshare_engine::{AdminFacade, TransitionEngine};
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;

/// Requests seen from one IP in the current window, and when it opened.
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

pub(crate) struct RateLimiter {
    tracker: Mutex<IpTracker>,
    max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
        }
    }

    /// `Err(retry_after_secs)` once `ip` is over its budget for the window.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;
        // Drop clients whose window has closed so the map tracks only live IPs.
        tracker.retain(|_, (_, opened)| {
            now.duration_since(*opened).as_secs() < RATE_LIMIT_WINDOW_SECS
        });
        let entry = tracker.entry(ip).or_insert((0, now));

        let elapsed = now.duration_since(entry.1).as_secs();
        entry.0 += 1;
        if entry.0 > self.max_requests {
            Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct AppState<S> {
    pub(crate) engine: Arc<TransitionEngine<S>>,
    pub(crate) admin: AdminFacade<S>,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn limiter_blocks_after_budget_and_resets() {
        let limiter = RateLimiter::new(2);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let start = Instant::now();

        assert!(limiter.check_at(ip, start).await.is_ok());
        assert!(limiter.check_at(ip, start).await.is_ok());
        assert_eq!(limiter.check_at(ip, start).await, Err(RATE_LIMIT_WINDOW_SECS));
        assert!(limiter.check_at(other, start).await.is_ok());

        let later = start + Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        assert!(limiter.check_at(ip, later).await.is_ok());
    }

    #[tokio::test]
    async fn expired_clients_are_evicted() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for last in 1..=20u8 {
            let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, last));
            limiter.check_at(ip, start).await.unwrap();
        }
        assert_eq!(limiter.tracker.lock().await.len(), 20);

        let later = start + Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        let fresh = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
        limiter.check_at(fresh, later).await.unwrap();

        let tracker = limiter.tracker.lock().await;
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains_key(&fresh));
    }
}
