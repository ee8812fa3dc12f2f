//! Per-domain politeness (§4.3).
//!
//! A process-local map `domain -> next_allowed_at`, advisory only and not
//! persisted across restarts: robots.txt and adaptive delay are re-derived
//! on the first probe of a new run. `adaptive_delay` itself is still
//! written back to the `domains` row so a restart doesn't forget a host
//! that has been aggressively throttling us, but the *scheduling* decision
//! lives here, in memory, behind a `DashMap` the same way `status.rs` keys
//! per-service state.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const ADAPTIVE_MULTIPLIER: f64 = 2.0;
const ADAPTIVE_DECAY: f64 = 0.9;
const ADAPTIVE_CAP: Duration = Duration::from_secs(30);
/// Seed delay for the first 429/5xx a domain with no configured floor hits —
/// `0.0 * ADAPTIVE_MULTIPLIER` would otherwise stay zero forever.
const ADAPTIVE_MIN_START: Duration = Duration::from_millis(500);

struct DomainRate {
    next_allowed_at: Instant,
    adaptive_delay: Duration,
}

#[derive(Clone, Default)]
pub struct DomainLimiter {
    inner: Arc<DashMap<i32, Mutex<DomainRate>>>,
}

impl DomainLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, domain_id: i32, floor: Duration) -> dashmap::mapref::one::Ref<'_, i32, Mutex<DomainRate>> {
        self.inner.entry(domain_id).or_insert_with(|| {
            Mutex::new(DomainRate {
                next_allowed_at: Instant::now(),
                adaptive_delay: floor,
            })
        });
        self.inner.get(&domain_id).expect("just inserted")
    }

    /// True if this domain may be fetched right now.
    pub async fn is_eligible(&self, domain_id: i32, floor: Duration) -> bool {
        let guard = self.entry(domain_id, floor);
        let rate = guard.lock().await;
        Instant::now() >= rate.next_allowed_at
    }

    /// Record a fetch outcome: schedule the next allowed time using
    /// `max(crawl_delay, adaptive_delay)`, and adjust `adaptive_delay` per
    /// §4.3 step 4 (multiplicative increase on 429/5xx, decay on success).
    /// Returns the resulting adaptive delay so the caller can persist it.
    pub async fn record_outcome(
        &self,
        domain_id: i32,
        crawl_delay: Duration,
        floor: Duration,
        status_code: u16,
    ) -> Duration {
        let guard = self.entry(domain_id, floor);
        let mut rate = guard.lock().await;

        if status_code == 429 || status_code >= 500 {
            let base = if rate.adaptive_delay.is_zero() {
                ADAPTIVE_MIN_START
            } else {
                rate.adaptive_delay
            };
            let scaled = base.mul_f64(ADAPTIVE_MULTIPLIER);
            rate.adaptive_delay = scaled.min(ADAPTIVE_CAP).max(floor);
        } else {
            let decayed = rate.adaptive_delay.mul_f64(ADAPTIVE_DECAY);
            rate.adaptive_delay = decayed.max(floor);
        }

        let effective = crawl_delay.max(rate.adaptive_delay);
        rate.next_allowed_at = Instant::now() + effective;
        rate.adaptive_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_domain_is_eligible() {
        let limiter = DomainLimiter::new();
        assert!(limiter.is_eligible(1, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn error_status_increases_adaptive_delay() {
        let limiter = DomainLimiter::new();
        let floor = Duration::from_millis(100);
        let first = limiter
            .record_outcome(1, Duration::ZERO, floor, 503)
            .await;
        let second = limiter
            .record_outcome(1, Duration::ZERO, floor, 503)
            .await;
        assert!(second > first);
    }

    #[tokio::test]
    async fn error_status_increases_adaptive_delay_with_zero_floor() {
        let limiter = DomainLimiter::new();
        let first = limiter
            .record_outcome(2, Duration::ZERO, Duration::ZERO, 429)
            .await;
        assert!(first > Duration::ZERO);
        let second = limiter
            .record_outcome(2, Duration::ZERO, Duration::ZERO, 429)
            .await;
        assert!(second > first);
    }
}
