//! C4's display contract: an append-only ring of log lines, an append-only
//! ring of online-data lines, and the per-zone record an external display
//! surface renders.

use crate::event::ScoringItem;
use std::collections::VecDeque;
use std::time::Duration;

/// How many of the most recent log/online-data lines are handed to the
/// display per refresh. Distinct from the ring's total retention capacity
/// (`CoreConfig::display_log_size`).
pub const DISPLAY_TAIL_LINES: usize = 50;

/// Append-only ring buffer bounded by `capacity`; oldest lines drop off.
#[derive(Debug, Clone)]
pub struct DisplaySurface {
    log: VecDeque<String>,
    online_data: VecDeque<String>,
    capacity: usize,
}

impl DisplaySurface {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: VecDeque::with_capacity(capacity.min(64)),
            online_data: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        Self::push_bounded(&mut self.log, self.capacity, line.into());
    }

    pub fn push_online(&mut self, line: impl Into<String>) {
        Self::push_bounded(&mut self.online_data, self.capacity, line.into());
    }

    fn push_bounded(ring: &mut VecDeque<String>, capacity: usize, line: String) {
        if ring.len() >= capacity {
            ring.pop_front();
        }
        ring.push_back(line);
    }

    pub fn last_log(&self, n: usize) -> Vec<String> {
        Self::last(&self.log, n)
    }

    pub fn last_online(&self, n: usize) -> Vec<String> {
        Self::last(&self.online_data, n)
    }

    fn last(ring: &VecDeque<String>, n: usize) -> Vec<String> {
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }
}

/// A contiguous run of `ScoringItem`s sharing the same `group`, projected
/// as parallel sequences per the display contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringGroupView {
    pub group: String,
    pub descriptions: Vec<String>,
    pub current_values: Vec<i64>,
}

/// Groups a scoring sequence by contiguous runs of equal `group`
/// (`spec.md` §3: "groups are contiguous runs of equal group").
pub fn group_scoring(items: &[ScoringItem]) -> Vec<ScoringGroupView> {
    let mut groups: Vec<ScoringGroupView> = Vec::new();
    for item in items {
        match groups.last_mut() {
            Some(group) if group.group == item.group => {
                group.descriptions.push(item.desc.clone());
                group.current_values.push(item.current_value);
            }
            _ => groups.push(ScoringGroupView {
                group: item.group.clone(),
                descriptions: vec![item.desc.clone()],
                current_values: vec![item.current_value],
            }),
        }
    }
    groups
}

/// The per-zone record an external display surface consumes.
#[derive(Debug, Clone)]
pub struct ZoneDisplay {
    pub timer: Duration,
    pub state: String,
    pub manual_operation: String,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub log: Vec<String>,
    pub online_data: Vec<String>,
    pub scoring: Vec<ScoringGroupView>,
}
