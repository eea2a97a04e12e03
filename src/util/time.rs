//! Time utilities for the tick clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Host start time for uptime tracking
static HOST_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize host start time (call once at startup)
pub fn init_server_time() {
    HOST_START.get_or_init(Instant::now);
}

/// Get host uptime in seconds
pub fn uptime_secs() -> u64 {
    HOST_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Default simulation ticks per second
pub const DEFAULT_TICK_RATE: u32 = 30;
/// Default snapshots per second
pub const DEFAULT_SNAPSHOT_RATE: u32 = 20;

/// Fixed delta time for one tick (in seconds)
pub fn tick_delta(tick_rate: u32) -> f32 {
    1.0 / tick_rate.max(1) as f32
}

/// Wall-clock duration of one tick
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / tick_rate.max(1) as u64)
}

/// Number of ticks between two snapshots (at least one)
pub fn snapshot_interval(tick_rate: u32, snapshot_rate: u32) -> u32 {
    (tick_rate / snapshot_rate.max(1)).max(1)
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_interval_never_zero() {
        assert_eq!(snapshot_interval(30, 20), 1);
        assert_eq!(snapshot_interval(60, 20), 3);
        assert_eq!(snapshot_interval(10, 60), 1);
        assert_eq!(snapshot_interval(30, 0), 30);
    }

    #[test]
    fn test_tick_delta_matches_rate() {
        assert!((tick_delta(30) - 1.0 / 30.0).abs() < f32::EPSILON);
        assert_eq!(tick_duration(50), Duration::from_millis(20));
    }
}
