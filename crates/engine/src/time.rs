use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source read by the playback clock and the scheduler.
///
/// Values are offsets from an arbitrary origin fixed at construction.
pub trait TimeSource {
    fn now(&self) -> Duration;
}

/// Wall-clock source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced source for deterministic playback.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// move another into the engine.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use engine::time::{ManualTimeSource, TimeSource};
///
/// let time = ManualTimeSource::new();
/// let shared = time.clone();
/// time.advance(Duration::from_millis(250));
/// assert_eq!(shared.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    micros: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(duration_to_micros(by), Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.micros.store(duration_to_micros(at), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

fn duration_to_micros(value: Duration) -> u64 {
    u64::try_from(value.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ManualTimeSource, TimeSource};

    #[test]
    fn manual_source_set_overrides_accumulated_time() {
        let time = ManualTimeSource::new();
        time.advance(Duration::from_secs(3));
        time.set(Duration::from_millis(500));
        assert_eq!(time.now(), Duration::from_millis(500));
    }
}
