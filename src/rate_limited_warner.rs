use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default minimum interval between dropped-entry warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

const NEVER: u64 = u64::MAX;

/// Helper that rate limits dropped-entry warnings.
///
/// The caller increments the drop counter via [`record_drop`]. The next call to
/// [`warn_if_due`] emits a warning using the provided callback if the configured
/// interval has elapsed. [`flush`] emits a warning immediately if any entries
/// have been dropped since the last emission.
///
/// [`record_drop`]: RateLimitedWarner::record_drop
/// [`warn_if_due`]: RateLimitedWarner::warn_if_due
/// [`flush`]: RateLimitedWarner::flush
pub struct RateLimitedWarner {
    origin: Instant,
    interval_ms: u64,
    /// Milliseconds since `origin` of the last warning, or `NEVER`.
    last_warn: AtomicU64,
    dropped: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// Create a warner. The first warning can be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_ms: interval.as_millis().min(u128::from(u64::MAX - 1)) as u64,
            last_warn: AtomicU64::new(NEVER),
            dropped: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis().min(u128::from(NEVER - 1)) as u64
    }

    /// Increment the dropped-entry counter.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of drops not yet reported.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = self.now_ms();
        let prev = self.last_warn.load(Ordering::Relaxed);
        let due = prev == NEVER || now.saturating_sub(prev) >= self.interval_ms;
        if !due {
            return;
        }
        if self
            .last_warn
            .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Immediately warn about any dropped entries.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(self.now_ms(), Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for RateLimitedWarner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedWarner")
            .field("interval_ms", &self.interval_ms)
            .field("pending", &self.pending())
            .finish()
    }
}
