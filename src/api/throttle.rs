//! Process-wide minimum interval between outbound API requests.
//!
//! A single [`Throttle`] is created per process and shared through an `Arc`
//! with every client that talks to the API. Each call to
//! [`Throttle::acquire`] returns only once at least `interval` has passed
//! since the previous caller was let through, measured from the *start* of
//! that previous request.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use arxiv_crawler::api::Throttle;
//!
//! # async fn example() {
//! let throttle = Arc::new(Throttle::new(Duration::from_secs(3)));
//! throttle.acquire().await; // immediate
//! throttle.acquire().await; // waits ~3s
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative throttle delay (5 minutes).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(300);

/// Minimum-interval gate for outbound requests.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,

    /// Start time of the most recent request let through.
    /// `None` until the first request, which proceeds immediately.
    last_start: Mutex<Option<Instant>>,

    cumulative_delay_ms: AtomicU64,
    warned: AtomicBool,
}

impl Throttle {
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = interval.as_millis()))]
    pub fn new(interval: Duration) -> Self {
        debug!("creating request throttle");
        Self {
            interval,
            last_start: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
            warned: AtomicBool::new(false),
        }
    }

    /// A throttle that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }

    /// Total time callers have spent waiting in [`acquire`](Self::acquire).
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::Relaxed))
    }

    /// Waits until a request may start, then records the start time.
    ///
    /// The lock is held across the sleep so concurrent callers queue up and
    /// are released one interval apart. Returns how long this caller waited.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }

        let mut last_start = self.last_start.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(previous) = *last_start {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                waited = self.interval - elapsed;
                self.record_delay(waited);
                debug!(delay_ms = waited.as_millis(), "throttling API request");
                tokio::time::sleep(waited).await;
            }
        }

        *last_start = Some(Instant::now());
        waited
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_delay(&self, delay: Duration) {
        let delay_ms = delay.as_millis() as u64;
        let total = self.cumulative_delay_ms.fetch_add(delay_ms, Ordering::Relaxed) + delay_ms;
        if Duration::from_millis(total) >= CUMULATIVE_DELAY_WARNING_THRESHOLD
            && !self.warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                cumulative_delay_secs = total / 1000,
                "request throttling has added over five minutes of waiting; consider a narrower query"
            );
        }
    }
}
