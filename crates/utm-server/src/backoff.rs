//! Exponential backoff with jitter for calls into the durable store.
//!
//! Driven by caller-supplied wall-clock time so the zone cache can share the
//! same `now` it uses for its TTL.

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    next_attempt_at: Option<DateTime<Utc>>,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            next_attempt_at: None,
            jitter_ratio: 0.2,
        }
    }

    pub fn ready(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| now >= at)
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.next_attempt_at = None;
    }

    /// Record a failure at `now` and return the delay before the next attempt.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Duration {
        let delay = add_jitter(self.current, self.jitter_ratio).min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        let delay_delta = chrono::Duration::from_std(delay).unwrap_or_default();
        self.next_attempt_at = Some(now.checked_add_signed(delay_delta).unwrap_or(now));
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) {
        return delay;
    }

    let jitter_ms_max = ((delay.as_millis() as f64) * ratio) as u128;
    if jitter_ms_max == 0 {
        return delay;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let jitter_ms = (now_nanos as u128) % (jitter_ms_max + 1);
    delay + Duration::from_millis(jitter_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backoff_is_ready() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert!(backoff.ready(Utc::now()));
    }

    #[test]
    fn fail_blocks_until_delay_elapses() {
        let now = Utc::now();
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        let delay = backoff.fail(now);
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_millis(1200));
        assert!(!backoff.ready(now));
        assert!(backoff.ready(now + chrono::Duration::seconds(2)));

        backoff.reset();
        assert!(backoff.ready(now));
    }

    #[test]
    fn delays_double_and_saturate_at_max() {
        let now = Utc::now();
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(3));

        backoff.fail(now);
        let second = backoff.fail(now);
        assert!(second >= Duration::from_secs(2));

        backoff.fail(now);
        let capped = backoff.fail(now);
        assert_eq!(capped, Duration::from_secs(3));
    }
}
