//! C4 — Executor Base: the phase machine, scoring table, and display
//! projection shared by every executor variant. Per the re-architecture
//! note in `spec.md` §9, this is a plain value type consumed by each
//! variant's own reducer rather than a base class with virtual hooks.

pub mod external;
pub mod fleet;
pub mod simple;

pub use external::ExternallyControlledExecutor;
pub use fleet::AllRobotsExecutor;
pub use simple::{DeviceActuator, DeviceFields, SimpleExecutor};

use crate::display::{group_scoring, DisplaySurface, ZoneDisplay, DISPLAY_TAIL_LINES};
use crate::error::CoreResult;
use crate::event::Event;
use crate::secure_channel::BenchmarkState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

/// PRE is initial; EXEC is entered once by `start`; POST is terminal
/// (the externally-controlled executor may logically re-enter EXEC
/// between goals, but `phase` itself never moves backwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Exec,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pre => "PRE",
            Phase::Exec => "EXEC",
            Phase::Post => "POST",
        };
        write!(f, "{s}")
    }
}

/// The common enum shared by all three fields of `RefBoxStateTriple`; not
/// every value is meaningful in every field (`spec.md` §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefBoxState {
    Start,
    ExecutingBenchmark,
    End,
    Stop,
    EmergencyStop,
    Error,
    GlobalTimeout,
    Ready,
    TransmittingGoal,
    ExecutingGoal,
    GoalTimeout,
    ExecutingManualOperation,
}

impl fmt::Display for RefBoxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Externally-controlled-only. Three independent fields, each with its own
/// payload string (`spec.md` §3). The newer three-field triple, not the
/// older single-field `refbox_state_`, is authoritative (`spec.md` §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefBoxStateTriple {
    pub benchmark_state: RefBoxState,
    pub benchmark_payload: String,
    pub goal_execution_state: RefBoxState,
    pub goal_execution_payload: String,
    pub manual_operation_state: RefBoxState,
    pub manual_operation_payload: String,
}

impl RefBoxStateTriple {
    pub fn new(
        benchmark_state: RefBoxState,
        goal_execution_state: RefBoxState,
        manual_operation_state: RefBoxState,
    ) -> Self {
        Self {
            benchmark_state,
            benchmark_payload: String::new(),
            goal_execution_state,
            goal_execution_payload: String::new(),
            manual_operation_state,
            manual_operation_payload: String::new(),
        }
    }

    /// Before `start()`: nothing is executing or ready yet.
    pub fn initial() -> Self {
        Self::new(RefBoxState::Start, RefBoxState::Start, RefBoxState::Start)
    }

    /// Returns whether the field actually changed, so callers can suppress
    /// a latched republish when nothing changed (`SPEC_FULL.md` §3).
    pub fn set_benchmark_state(&mut self, state: RefBoxState, payload: impl Into<String>) -> bool {
        Self::set_field(&mut self.benchmark_state, &mut self.benchmark_payload, state, payload)
    }

    pub fn set_goal_execution_state(
        &mut self,
        state: RefBoxState,
        payload: impl Into<String>,
    ) -> bool {
        Self::set_field(
            &mut self.goal_execution_state,
            &mut self.goal_execution_payload,
            state,
            payload,
        )
    }

    pub fn set_manual_operation_state(
        &mut self,
        state: RefBoxState,
        payload: impl Into<String>,
    ) -> bool {
        Self::set_field(
            &mut self.manual_operation_state,
            &mut self.manual_operation_payload,
            state,
            payload,
        )
    }

    fn set_field(
        field: &mut RefBoxState,
        field_payload: &mut String,
        state: RefBoxState,
        payload: impl Into<String>,
    ) -> bool {
        let payload = payload.into();
        if *field == state && *field_payload == payload {
            false
        } else {
            if *field != state {
                log::info!(target: crate::log_paths::REFBOX_STATE, "{state}");
            }
            if *field_payload != payload {
                log::info!(target: crate::log_paths::REFBOX_STATE_PAYLOAD, "{payload}");
            }
            *field = state;
            *field_payload = payload;
            true
        }
    }
}

/// Phase/timer/scoring/display machinery shared by every variant. Timer
/// ownership lives on the variant (Simple owns one, External owns two) so
/// this type never has to guess which timer a given transition should arm.
pub struct ExecutorBase {
    pub instance_id: Uuid,
    pub event: Event,
    pub phase: Phase,
    pub benchmark_state: BenchmarkState,
    pub scoring: Vec<crate::event::ScoringItem>,
    pub display: DisplaySurface,
    pub last_stop_time: Option<Instant>,
    pub timed_out: bool,
    pub state_description: String,
    after_stop_duration: Duration,
    timeout_tx: watch::Sender<u64>,
}

impl ExecutorBase {
    pub fn new(event: Event, display_log_size: usize, after_stop_duration: Duration) -> Self {
        let scoring = event
            .benchmark
            .scoring
            .iter()
            .map(crate::event::ScoringItem::from_template)
            .collect();
        let (timeout_tx, _rx) = watch::channel(0u64);
        Self {
            instance_id: Uuid::new_v4(),
            event,
            phase: Phase::Pre,
            benchmark_state: BenchmarkState::Stop,
            scoring,
            display: DisplaySurface::new(display_log_size),
            last_stop_time: None,
            timed_out: false,
            state_description: String::new(),
            after_stop_duration,
            timeout_tx,
        }
    }

    /// Fires the one-shot `/timeout` notification (`spec.md` §4.4: "...also
    /// publishing a one-shot timeout event for observers"), a dedicated
    /// channel distinct from the state-description/triple updates a
    /// `phase_post` call already makes.
    pub fn publish_timeout(&self) {
        let next = *self.timeout_tx.borrow() + 1;
        let _ = self.timeout_tx.send(next);
    }

    /// Subscribes to the `/timeout` notification channel; the count
    /// increments by exactly one per arming that actually expires.
    pub fn subscribe_timeout(&self) -> watch::Receiver<u64> {
        self.timeout_tx.subscribe()
    }

    /// Base policy (`spec.md` §4.4): PRE/EXEC/POST -> EXEC, BenchmarkState
    /// forced to PREPARE, timeout flag cleared. Arming the caller's own
    /// timer is the caller's responsibility since the base doesn't know
    /// how many timers a variant owns.
    pub fn phase_exec(&mut self, desc: &str) {
        self.phase = Phase::Exec;
        self.benchmark_state = BenchmarkState::Prepare;
        self.timed_out = false;
        self.describe(desc);
    }

    /// Externally-controlled-only entry point for `start()`: PRE -> EXEC
    /// without touching BenchmarkState or any timer (`spec.md` §4.6:
    /// "No timer runs yet; the script is expected to send the first
    /// request").
    pub fn enter_exec_no_arm(&mut self, desc: &str) {
        self.phase = Phase::Exec;
        self.describe(desc);
    }

    /// Base policy: phase -> POST, BenchmarkState forced to STOP. Pausing
    /// the caller's own timer(s) is the caller's responsibility.
    pub fn phase_post(&mut self, now: Instant, desc: &str) {
        self.phase = Phase::Post;
        self.last_stop_time = Some(now);
        self.benchmark_state = BenchmarkState::Stop;
        self.describe(desc);
    }

    fn describe(&mut self, desc: &str) {
        self.state_description = desc.to_string();
        if !desc.is_empty() {
            self.display.push_log(desc.to_string());
        }
    }

    pub fn set_score(&mut self, group: &str, desc: &str, value: i64) {
        if let Some(item) = self.scoring.iter_mut().find(|s| s.matches(group, desc)) {
            item.current_value = value;
            log::info!(target: crate::log_paths::SCORE, "{group}/{desc} = {value}");
            self.display
                .push_log(format!("score {group}/{desc} = {value}"));
        } else {
            log::error!("set_score: no such scoring item {group}/{desc}");
            self.display
                .push_log(format!("ERROR: unknown scoring item {group}/{desc}"));
        }
    }

    /// Default no-op implementations of the referee-facing manual-operation
    /// hooks (`spec.md` §4.4); Simple and Externally Controlled executors
    /// override the ones they actually support.
    pub fn manual_operation_complete_ignored(&mut self) {
        log::warn!("manual_operation_complete: command ignored by this executor");
    }

    pub fn omf_complete_ignored(&mut self) {
        log::warn!("omf_complete: command ignored by this executor");
    }

    pub fn omf_damaged_ignored(&mut self, n: u32) {
        log::warn!("omf_damaged({n}): command ignored by this executor");
    }

    pub fn omf_button_ignored(&mut self, n: u32) {
        log::warn!("omf_button({n}): command ignored by this executor");
    }

    /// The POST phase's display timer is a post-hoc settling-window
    /// countdown rather than the caller's timer (`spec.md` §4.4).
    pub fn timer_remaining_for_display(&self, now: Instant, running_timer_remaining: Duration) -> Duration {
        match self.phase {
            Phase::Post => {
                let elapsed = self
                    .last_stop_time
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::ZERO);
                self.after_stop_duration.saturating_sub(elapsed)
            }
            _ => running_timer_remaining,
        }
    }

    /// The shared parts of `fill()` (`spec.md` §4.4); variants layer
    /// `start_enabled`/`stop_enabled`/`manual_operation` on top since those
    /// differ per variant (`spec.md` §3).
    pub fn fill_common(&self, timer: Duration) -> ZoneDisplay {
        ZoneDisplay {
            timer,
            state: self.state_description.clone(),
            manual_operation: String::new(),
            start_enabled: false,
            stop_enabled: false,
            log: self.display.last_log(DISPLAY_TAIL_LINES),
            online_data: self.display.last_online(DISPLAY_TAIL_LINES),
            scoring: group_scoring(&self.scoring),
        }
    }
}

/// Common teardown contract: disconnect channel callbacks, close the
/// socket, and remove the team from the shared benchmarking registry
/// (`spec.md` §4.2, §5).
pub trait StopCommunication {
    fn stop_communication(&mut self, shared: &crate::shared_state::SharedState) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_never_observed_moving_backwards_through_base_transitions() {
        let event = crate::event::Event {
            team: "t".into(),
            round: 1,
            run: 1,
            benchmark_code: "b".into(),
            benchmark: crate::event::BenchmarkDescriptor {
                timeout: Duration::from_secs(1),
                total_timeout: Duration::from_secs(10),
                prefix: "x".into(),
                scoring: vec![],
            },
            password: "p".into(),
            cipher_suite: "aes-128-cbc".into(),
        };
        let mut base = ExecutorBase::new(event, 100, Duration::from_secs(120));
        assert_eq!(base.phase, Phase::Pre);
        base.phase_exec("start");
        assert_eq!(base.phase, Phase::Exec);
        assert_eq!(base.benchmark_state, BenchmarkState::Prepare);
        base.phase_post(Instant::now(), "done");
        assert_eq!(base.phase, Phase::Post);
        assert_eq!(base.benchmark_state, BenchmarkState::Stop);
    }

    #[test]
    fn triple_publish_suppressed_when_state_and_payload_unchanged() {
        let mut triple = RefBoxStateTriple::initial();
        assert!(!triple.set_benchmark_state(RefBoxState::Start, ""));
        assert!(triple.set_benchmark_state(RefBoxState::ExecutingBenchmark, ""));
        assert!(!triple.set_benchmark_state(RefBoxState::ExecutingBenchmark, ""));
    }

    #[test]
    fn set_score_on_unknown_item_logs_and_does_not_panic() {
        let event = crate::event::Event {
            team: "t".into(),
            round: 1,
            run: 1,
            benchmark_code: "b".into(),
            benchmark: crate::event::BenchmarkDescriptor {
                timeout: Duration::from_secs(1),
                total_timeout: Duration::from_secs(10),
                prefix: "x".into(),
                scoring: vec![],
            },
            password: "p".into(),
            cipher_suite: "aes-128-cbc".into(),
        };
        let mut base = ExecutorBase::new(event, 100, Duration::from_secs(120));
        base.set_score("nav", "missing", 1);
        assert!(base.display.last_log(1)[0].contains("unknown scoring item"));
    }
}
