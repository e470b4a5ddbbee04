//! The process-wide Shared State object (`spec.md` §9): owns the
//! active-robots registry and the currently-benchmarking-robots map, with
//! an explicit lifecycle rather than an implicit singleton. Every executor
//! holds a reference to one instance for the duration of its run.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Liveness record for a robot observed on any channel, keyed by team.
#[derive(Debug, Clone)]
pub struct ActiveRobotRecord {
    pub robot_name: String,
    pub last_skew_ms: i64,
    pub last_seen: Instant,
}

/// Port and robot-name assignment for a team's currently running executor.
#[derive(Debug, Clone)]
pub struct BenchmarkingEntry {
    pub robot_name: String,
    pub port: u16,
}

pub struct SharedState {
    active_robots: Mutex<HashMap<String, ActiveRobotRecord>>,
    benchmarking_robots: Mutex<HashMap<String, BenchmarkingEntry>>,
    next_port: AtomicU32,
    base_port: u16,
    port_range: u16,
}

impl SharedState {
    pub fn new(base_port: u16, port_range: u16) -> Self {
        Self {
            active_robots: Mutex::new(HashMap::new()),
            benchmarking_robots: Mutex::new(HashMap::new()),
            next_port: AtomicU32::new(0),
            base_port,
            port_range: port_range.max(1),
        }
    }

    /// Monotonic allocator: wraps across `port_range` starting at
    /// `base_port`. A bind failure on the returned port is a resource-
    /// transient condition (`spec.md` §4.2); the caller retries with the
    /// next call to this method.
    pub fn alloc_port(&self) -> u16 {
        let offset = self.next_port.fetch_add(1, Ordering::Relaxed) % self.port_range as u32;
        self.base_port.wrapping_add(offset as u16)
    }

    pub fn record_beacon(&self, team: &str, robot_name: &str, skew_ms: i64, now: Instant) {
        self.active_robots.lock().insert(
            team.to_string(),
            ActiveRobotRecord {
                robot_name: robot_name.to_string(),
                last_skew_ms: skew_ms,
                last_seen: now,
            },
        );
    }

    pub fn active_robots_snapshot(&self) -> Vec<(String, ActiveRobotRecord)> {
        self.active_robots
            .lock()
            .iter()
            .map(|(team, record)| (team.clone(), record.clone()))
            .collect()
    }

    /// Registers a team as benchmarking. Per `spec.md` §3 invariant 5,
    /// exactly one executor may own a team's channel at a time; a second
    /// attempt is a protocol-error-remote condition, not fatal to the
    /// caller, who is expected to skip that team (see C7 construction).
    pub fn register_benchmarking(
        &self,
        team: &str,
        robot_name: &str,
        port: u16,
    ) -> CoreResult<()> {
        let mut map = self.benchmarking_robots.lock();
        if map.contains_key(team) {
            return Err(CoreError::protocol_remote(format!(
                "team '{team}' is already benchmarking"
            )));
        }
        map.insert(
            team.to_string(),
            BenchmarkingEntry {
                robot_name: robot_name.to_string(),
                port,
            },
        );
        Ok(())
    }

    pub fn unregister_benchmarking(&self, team: &str) {
        self.benchmarking_robots.lock().remove(team);
    }

    pub fn is_benchmarking(&self, team: &str) -> bool {
        self.benchmarking_robots.lock().contains_key(team)
    }

    pub fn benchmarking_entry(&self, team: &str) -> Option<BenchmarkingEntry> {
        self.benchmarking_robots.lock().get(team).cloned()
    }
}
