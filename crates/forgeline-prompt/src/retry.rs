use rand::Rng;

/// Retry behaviour for the `real` LM backend: exponential backoff with
/// jitter, starting at `backoff_base_ms` and capped at `backoff_max_ms`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Jitter fraction applied symmetrically to each computed delay, e.g.
    /// `0.2` for ±20%.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for `attempt` (0-indexed), capped, then
    /// perturbed by up to ±`jitter_fraction`.
    pub fn backoff_with_jitter(&self, attempt: u32) -> std::time::Duration {
        let base = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.backoff_max_ms);
        let jitter_span = (base as f64 * self.jitter_fraction) as i64;
        let delta: i64 = if jitter_span == 0 {
            0
        } else {
            rand::thread_rng().gen_range(-jitter_span..=jitter_span)
        };
        let millis = (base as i64 + delta).max(0) as u64;
        std::time::Duration::from_millis(millis)
    }
}

/// Whether a transport failure is worth retrying: rate-limit (429),
/// timeout, and server errors (5xx) are retryable; 4xx client errors other
/// than 429 are not.
pub fn is_retryable(status: Option<u16>, timed_out: bool) -> bool {
    if timed_out {
        return true;
    }
    match status {
        Some(429) => true,
        Some(s) if (500..600).contains(&s) => true,
        Some(_) => false,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_with_jitter(0).as_millis(), 500);
        assert_eq!(policy.backoff_with_jitter(1).as_millis(), 1000);
        assert_eq!(policy.backoff_with_jitter(2).as_millis(), 2000);
    }

    #[test]
    fn backoff_respects_cap() {
        let policy = RetryPolicy {
            backoff_max_ms: 1000,
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_with_jitter(5).as_millis(), 1000);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let millis = policy.backoff_with_jitter(0).as_millis() as i64;
            assert!((400..=600).contains(&millis), "jittered delay {millis} out of ±20% band");
        }
    }

    #[test]
    fn server_errors_and_429_and_timeouts_are_retryable() {
        assert!(is_retryable(Some(503), false));
        assert!(is_retryable(Some(429), false));
        assert!(is_retryable(None, true));
    }

    #[test]
    fn bad_request_is_not_retryable() {
        assert!(!is_retryable(Some(400), false));
    }
}
