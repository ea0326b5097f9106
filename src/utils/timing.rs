//! Time sources and step timers.
//!
//! Cache expiry and order timestamps read time through [`Clock`] so tests can
//! freeze or advance it without sleeping.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A timer for measuring the steps of one operation
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "📍 {} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log the total and per-step durations, warning past `threshold_ms`.
    pub fn finish_with_threshold(self, threshold_ms: u64) -> Duration {
        let total_duration = self.start_time.elapsed();

        info!(
            "🕐 {} completed in {}ms",
            self.operation_name,
            total_duration.as_millis()
        );
        let mut last_time = self.start_time;
        for (name, time) in &self.checkpoints {
            debug!(
                "   └─ {}: {}ms",
                name,
                time.duration_since(last_time).as_millis()
            );
            last_time = *time;
        }

        if total_duration.as_millis() > threshold_ms as u128 {
            warn!(
                "⚠️ {} took {}ms (exceeds threshold of {}ms)",
                self.operation_name,
                total_duration.as_millis(),
                threshold_ms
            );
        }

        total_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_timer_records_checkpoints() {
        let mut timer = Timer::start("unit");
        timer.checkpoint("a");
        timer.checkpoint("b");
        assert_eq!(timer.checkpoints.len(), 2);
        let total = timer.finish_with_threshold(10_000);
        assert!(total < Duration::from_secs(10));
    }
}
