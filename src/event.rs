//! Per-run input descriptor and the scoring schedule it carries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Either a boolean checkbox score or an unsigned counter score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringKind {
    Bool,
    UInt,
}

/// One entry of the event's scoring schedule, as declared by the zone/event
/// registry before the executor exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringTemplate {
    pub group: String,
    pub desc: String,
    pub kind: ScoringKind,
    pub initial_value: i64,
}

/// A live scoring entry inside a running executor. Unique within an executor
/// by `(group, desc)`; only `current_value` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringItem {
    pub group: String,
    pub desc: String,
    pub kind: ScoringKind,
    pub current_value: i64,
}

impl ScoringItem {
    pub fn from_template(template: &ScoringTemplate) -> Self {
        Self {
            group: template.group.clone(),
            desc: template.desc.clone(),
            kind: template.kind,
            current_value: template.initial_value,
        }
    }

    pub fn matches(&self, group: &str, desc: &str) -> bool {
        self.group == group && self.desc == desc
    }
}

/// Per-benchmark descriptor: timeouts, script prefix, and the scoring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkDescriptor {
    /// Per-goal timeout default (also used as the whole-run default for the
    /// Simple Executor, which has no separate goal concept).
    pub timeout: Duration,
    /// Whole-run cap; the externally-controlled executor's global timeout.
    pub total_timeout: Duration,
    /// Script coordination topic/service prefix. Empty is a configuration
    /// error for the externally-controlled executor.
    pub prefix: String,
    pub scoring: Vec<ScoringTemplate>,
}

/// Immutable per-run descriptor handed to an executor at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub team: String,
    pub round: u32,
    pub run: u32,
    pub benchmark_code: String,
    pub benchmark: BenchmarkDescriptor,
    /// Shared secret used to derive the secure channel's symmetric key.
    pub password: String,
    /// Cipher suite name, e.g. "aes-128-cbc" (see `secure_channel::cipher_suite_for`).
    pub cipher_suite: String,
}

impl Event {
    /// Used by the all-robots fan-out (C7) to build one child event per
    /// active robot from a shared template.
    pub fn for_team(&self, team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> BenchmarkDescriptor {
        BenchmarkDescriptor {
            timeout: Duration::from_secs(60),
            total_timeout: Duration::from_secs(600),
            prefix: "x".into(),
            scoring: vec![ScoringTemplate {
                group: "nav".into(),
                desc: "reached_goal".into(),
                kind: ScoringKind::Bool,
                initial_value: 0,
            }],
        }
    }

    #[test]
    fn scoring_item_created_from_template_keeps_key_but_is_independently_mutable() {
        let template = &descriptor().scoring[0];
        let mut item = ScoringItem::from_template(template);
        assert!(item.matches("nav", "reached_goal"));
        item.current_value = 1;
        assert_eq!(template.initial_value, 0);
    }

    #[test]
    fn for_team_clones_everything_but_the_team_id() {
        let event = Event {
            team: "alpha".into(),
            round: 1,
            run: 1,
            benchmark_code: "nav1".into(),
            benchmark: descriptor(),
            password: "secret".into(),
            cipher_suite: "aes-128-cbc".into(),
        };
        let other = event.for_team("bravo");
        assert_eq!(other.team, "bravo");
        assert_eq!(other.benchmark_code, event.benchmark_code);
    }
}
