//! Backoff rules used both for arXiv API pages and for PDF transfers.
//!
//! A failed request is first mapped to a [`FailureType`]. [`RetryPolicy`]
//! turns that plus the attempt count into a [`RetryDecision`].
//!
//! ```
//! use arxiv_crawler::retry::{RetryDecision, RetryPolicy, classify_http_status};
//!
//! let policy = RetryPolicy::default();
//! if let RetryDecision::Retry { delay, attempt } = policy.should_retry(classify_http_status(503), 1) {
//!     assert_eq!(attempt, 2);
//!     assert!(delay >= std::time::Duration::from_secs(1));
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

/// Attempts per request when nothing else is configured, first try included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Upper bound on any wait a server asks for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeouts, dropped connections, 408 and 5xx replies.
    Transient,

    /// Missing PDFs, rejected queries, bad URLs. Repeating the request is pointless.
    Permanent,

    /// HTTP 429. Retried after the server's Retry-After when it sends one.
    RateLimited,
}

impl FailureType {
    /// Whether a later attempt could still succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        /// Sleep before the next attempt.
        delay: Duration,
        /// Number of the attempt about to run; the first retry is 2.
        attempt: u32,
    },
    DoNotRetry {
        /// Recorded on the failed result.
        reason: String,
    },
}

/// Exponential backoff with a cap and random jitter.
///
/// The wait after failed attempt `n` is
/// `min(base_delay * multiplier^(n-1), max_delay)` plus up to `max_jitter`.
/// The defaults give roughly 1s then 2s across three attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try and never drops below 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Default timing with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Sets the jitter ceiling. Tests pass `Duration::ZERO` for exact delays.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows failed attempt number `attempt`, counted from 1.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if !failure_type.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "failure is not retryable".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "retry budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt) + self.jitter();
        debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Deterministic part of the wait after failed attempt `attempt`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let steps = f64::from(attempt.saturating_sub(1));
        let grown = self.base_delay.as_millis() as f64 * f64::from(self.backoff_multiplier).powf(steps);
        let ceiling = self.max_delay.as_millis() as f64;
        Duration::from_millis(grown.min(ceiling) as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        match self.max_jitter.as_millis() as u64 {
            0 => Duration::ZERO,
            ceiling => Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling)),
        }
    }
}

/// Maps a non-success status. Only 408, 429 and 5xx are worth repeating.
#[must_use]
#[allow(clippy::match_same_arms)]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// True for certificate and handshake failures, which repeat on every attempt.
#[must_use]
pub fn is_tls_error(error: &reqwest::Error) -> bool {
    let text = error.to_string().to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// Reads a Retry-After value given either as delta seconds or as an HTTP date.
///
/// Dates in the past mean "now". Anything above one hour is clamped.
///
/// ```
/// use std::time::Duration;
/// use arxiv_crawler::retry::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    let wait = if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "ignoring negative Retry-After");
            return None;
        };
        Duration::from_secs(seconds)
    } else {
        let Ok(at) = httpdate::parse_http_date(header_value) else {
            debug!(header_value, "ignoring malformed Retry-After");
            return None;
        };
        at.duration_since(std::time::SystemTime::now())
            .unwrap_or(Duration::ZERO)
    };

    if wait > MAX_RETRY_AFTER {
        warn!(requested_secs = wait.as_secs(), "clamping Retry-After to one hour");
        return Some(MAX_RETRY_AFTER);
    }
    Some(wait)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert!((policy.backoff_multiplier - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(9), Duration::from_secs(5));
    }

    #[test]
    fn test_should_retry_transient_within_budget() {
        let policy = RetryPolicy::with_max_attempts(3).with_max_jitter(Duration::ZERO);
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
        assert_eq!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 3
            }
        );
    }

    #[test]
    fn test_should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(decision, RetryDecision::DoNotRetry { reason } if reason.contains("exhausted")));
    }

    #[test]
    fn test_should_retry_permanent_never_retries() {
        let policy = RetryPolicy::with_max_attempts(10);
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1), 2.0)
            .with_max_jitter(Duration::from_millis(50));
        for _ in 0..50 {
            let RetryDecision::Retry { delay, .. } = policy.should_retry(FailureType::Transient, 1)
            else {
                panic!("expected retry");
            };
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_http_status_table() {
        assert_eq!(classify_http_status(408), FailureType::Transient);
        assert_eq!(classify_http_status(429), FailureType::RateLimited);
        assert_eq!(classify_http_status(500), FailureType::Transient);
        assert_eq!(classify_http_status(503), FailureType::Transient);
        assert_eq!(classify_http_status(400), FailureType::Permanent);
        assert_eq!(classify_http_status(401), FailureType::Permanent);
        assert_eq!(classify_http_status(403), FailureType::Permanent);
        assert_eq!(classify_http_status(404), FailureType::Permanent);
        assert_eq!(classify_http_status(302), FailureType::Permanent);
    }

    // ==================== Retry-After Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_negative_ignored() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn test_parse_retry_after_capped() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}
