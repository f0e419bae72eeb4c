use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub reset_after: Duration,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    pub fn allowed(limit: usize, remaining: usize, reset_after: Duration) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_after,
            retry_after: None,
        }
    }

    pub fn limited(limit: usize, reset_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_after,
            retry_after: Some(reset_after),
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.limit == 0 {
            return headers;
        }

        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            header_value(self.limit as u64),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            header_value(self.remaining as u64),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            header_value(duration_to_seconds(self.reset_after)),
        );
        if let Some(retry_after) = self.retry_after {
            headers.insert(RETRY_AFTER, header_value(duration_to_seconds(retry_after)));
        }

        headers
    }
}

fn header_value(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).expect("valid header value")
}

fn duration_to_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    let mut rounded = if nanos == 0 { secs } else { secs + 1 };
    if rounded == 0 {
        rounded = 1;
    }
    rounded
}

/// Per-key limiter guarding repeated lifecycle confirmations.
///
/// Keys are application instance ids; each key's attempt record is
/// independent. `clear` removes the record once the guarded lifecycle event
/// completes.
pub trait AttemptLimiter: Send + Sync + 'static {
    fn check(&mut self, key: &str) -> RateLimitDecision;
    fn clear(&mut self, key: &str);
}

/// Convenience alias for sharing a limiter through state.
pub type AttemptLimiterRef = std::sync::Arc<tokio::sync::Mutex<dyn AttemptLimiter>>;

/// No-op limiter that allows every attempt (config: `attempts.limit = 0`).
#[derive(Debug, Default)]
pub struct NoopAttemptLimiter;

impl AttemptLimiter for NoopAttemptLimiter {
    fn check(&mut self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::allowed(0, 0, Duration::ZERO)
    }

    fn clear(&mut self, _key: &str) {}
}

/// Sliding-window limiter keeping `(count, window_start)` per key.
///
/// On each attempt: first sight of a key creates `(1, now)` and allows.
/// Otherwise the count is incremented and the window checked first — an
/// attempt arriving after the window expired resets to `(1, now)` and is
/// allowed, never penalized for being the Nth of a stale window. Within the
/// window the attempt is rejected once `count / elapsed` reaches
/// `limit / window`.
#[derive(Debug)]
pub struct SlidingWindowAttemptLimiter {
    limit: u32,
    window: Duration,
    records: HashMap<String, (u32, Instant)>,
}

impl SlidingWindowAttemptLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            records: HashMap::new(),
        }
    }

    pub fn check_at(&mut self, key: &str, now: Instant) -> RateLimitDecision {
        let limit = self.limit as usize;
        let window = self.window;

        let Some((count, window_start)) = self.records.get_mut(key) else {
            self.records.insert(key.to_string(), (1, now));
            return RateLimitDecision::allowed(limit, limit.saturating_sub(1), window);
        };

        *count += 1;
        let elapsed = now.duration_since(*window_start);

        if elapsed >= window {
            *count = 1;
            *window_start = now;
            return RateLimitDecision::allowed(limit, limit.saturating_sub(1), window);
        }

        // count / elapsed >= limit / window, cross-multiplied to stay in
        // integer nanoseconds. A zero elapsed always trips the limit.
        let attempt_rate = u128::from(*count) * window.as_nanos();
        let allowed_rate = u128::from(self.limit) * elapsed.as_nanos();
        if attempt_rate >= allowed_rate {
            return RateLimitDecision::limited(limit, window.saturating_sub(elapsed));
        }

        let remaining = limit.saturating_sub(*count as usize);
        RateLimitDecision::allowed(limit, remaining, window.saturating_sub(elapsed))
    }
}

impl AttemptLimiter for SlidingWindowAttemptLimiter {
    fn check(&mut self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn clear(&mut self, key: &str) {
        self.records.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_headers_include_limits_and_reset() {
        let decision = RateLimitDecision::allowed(10, 4, Duration::from_secs(30));
        let headers = decision.headers();

        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "10");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "4");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "30");
        assert!(headers.get(RETRY_AFTER).is_none());
    }

    #[test]
    fn limited_headers_include_retry_after() {
        let decision = RateLimitDecision::limited(5, Duration::from_millis(1500));
        let headers = decision.headers();

        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(headers.get(RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn zero_limit_yields_no_headers() {
        let decision = RateLimitDecision::allowed(0, 0, Duration::from_secs(10));
        assert!(decision.headers().is_empty());
    }

    #[test]
    fn first_attempt_per_key_is_allowed() {
        let mut limiter = SlidingWindowAttemptLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("app-1", start).allowed);
        assert!(limiter.check_at("app-2", start).allowed);
    }

    #[test]
    fn burst_within_window_is_rejected() {
        let mut limiter = SlidingWindowAttemptLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("app-1", start).allowed);
        let second = limiter.check_at("app-1", start + Duration::from_secs(1));
        assert!(!second.allowed);
        assert!(second.retry_after.is_some());
    }

    #[test]
    fn expired_window_resets_before_rejecting() {
        let mut limiter = SlidingWindowAttemptLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("app-1", start).allowed);
        assert!(!limiter.check_at("app-1", start + Duration::from_secs(2)).allowed);
        // The window expired; the third attempt starts a fresh window even
        // though it is the third call overall.
        assert!(limiter.check_at("app-1", start + Duration::from_secs(6)).allowed);
        assert!(!limiter.check_at("app-1", start + Duration::from_secs(7)).allowed);
    }

    #[test]
    fn keys_do_not_contend() {
        let mut limiter = SlidingWindowAttemptLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("app-1", start).allowed);
        assert!(!limiter.check_at("app-1", start + Duration::from_secs(1)).allowed);
        assert!(limiter.check_at("app-2", start + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn clear_forgets_the_attempt_record() {
        let mut limiter = SlidingWindowAttemptLimiter::new(1, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.check_at("app-1", start).allowed);
        limiter.clear("app-1");
        assert!(limiter.check_at("app-1", start + Duration::from_secs(1)).allowed);
    }
}
