//! Wall-clock helpers for the host adapter that drives a channel's receive
//! loop. The core itself never reads the wall clock (`spec.md` Non-goals:
//! "clock synchronization with the robot" is explicitly out of scope — skew
//! is measured, not corrected) — every executor method that needs "now"
//! takes it as an explicit parameter (`src/timer.rs`). This module exists so
//! a host has one canonical way to produce the millisecond epoch timestamp
//! `BeaconTracker::record`/`on_robot_state` expect, rather than reinventing
//! it per integration (grounded in the teacher's
//! `chrono::DateTime::from_timestamp_micros` / `chrono::Utc::now()` idiom
//! for epoch conversions, e.g. `horus_manager/src/monitor.rs`).

use chrono::Utc;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn now_wall_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a millisecond epoch timestamp back to an RFC3339 string, for
/// display/log surfaces that want a human-readable beacon time.
pub fn wall_ms_to_rfc3339(wall_ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(wall_ms).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_wall_ms_round_trips_through_rfc3339() {
        let now = now_wall_ms();
        let formatted = wall_ms_to_rfc3339(now).expect("valid timestamp");
        assert!(formatted.contains('T'));
    }
}
