//! Time utilities for the client simulation

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Get current Unix timestamp in whole seconds (input capture stamp)
pub fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Tick rate configuration
pub const DEFAULT_TICK_RATE: u32 = 60; // 60 frames per second
pub const DEFAULT_SNAPSHOT_RATE: u32 = 20; // 20 snapshots per second
pub const DEFAULT_LATENCY_PROBE_MS: u64 = 1000;

/// Frame budget for a given rate, e.g. 1000/60 ms for 60 fps
pub fn frame_budget(rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / rate.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_budget_matches_rate() {
        assert_eq!(frame_budget(60), Duration::from_micros(16_666));
        assert_eq!(frame_budget(20), Duration::from_millis(50));
    }

    #[test]
    fn frame_budget_never_divides_by_zero() {
        assert_eq!(frame_budget(0), Duration::from_secs(1));
    }

    #[test]
    fn unix_secs_tracks_millis() {
        let ms = unix_millis();
        let s = unix_secs();
        assert!(s >= ms / 1000);
        assert!(s <= ms / 1000 + 1);
    }
}
