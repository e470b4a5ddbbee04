//! C6 — Externally Controlled Executor: the full three-party state machine.
//! Three orthogonal sub-states (`benchmark`, `goal_execution`,
//! `manual_operation`) coordinate the script, the robot, and the referee
//! (`spec.md` §4.6).

use super::{ExecutorBase, Phase, RefBoxState, RefBoxStateTriple};
use crate::display::ZoneDisplay;
use crate::error::CoreResult;
use crate::event::Event;
use crate::script_link::ScriptLink;
use crate::secure_channel::{BeaconTracker, BenchmarkState, RobotState, RobotStateFrame};
use crate::shared_state::SharedState;
use crate::timer::TimeControl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pure function (`spec.md` §8 property 7 / §4.6): the goal timer's armed
/// duration depends only on the script's requested timeout and the event's
/// configured defaults, never on mutable executor state.
pub fn select_goal_timeout(
    current_goal_timeout: Option<Duration>,
    default_timeout: Duration,
    total_timeout: Duration,
) -> Duration {
    if let Some(d) = current_goal_timeout {
        if d > Duration::ZERO {
            return d;
        }
    }
    if default_timeout < total_timeout {
        default_timeout
    } else {
        total_timeout
    }
}

pub struct ExternallyControlledExecutor {
    pub base: ExecutorBase,
    pub triple: RefBoxStateTriple,
    pub goal_timer: TimeControl,
    pub global_timer: TimeControl,
    pub beacon: BeaconTracker,
    pub link: ScriptLink,
    current_goal_payload: Option<String>,
    current_goal_timeout: Option<Duration>,
    goal_timed_out: Arc<AtomicBool>,
    global_timed_out: Arc<AtomicBool>,
}

impl ExternallyControlledExecutor {
    pub fn new(
        event: Event,
        display_log_size: usize,
        after_stop_duration: Duration,
    ) -> CoreResult<Self> {
        let link = ScriptLink::new(event.benchmark.prefix.clone(), RefBoxStateTriple::initial())?;
        let goal_timed_out = Arc::new(AtomicBool::new(false));
        let global_timed_out = Arc::new(AtomicBool::new(false));
        let goal_flag = goal_timed_out.clone();
        let global_flag = global_timed_out.clone();
        let goal_timer = TimeControl::new(event.benchmark.timeout, true, move || {
            goal_flag.store(true, Ordering::SeqCst);
        });
        let global_timer = TimeControl::new(event.benchmark.total_timeout, true, move || {
            global_flag.store(true, Ordering::SeqCst);
        });
        Ok(Self {
            base: ExecutorBase::new(event, display_log_size, after_stop_duration),
            triple: RefBoxStateTriple::initial(),
            goal_timer,
            global_timer,
            beacon: BeaconTracker::default(),
            link,
            current_goal_payload: None,
            current_goal_timeout: None,
            goal_timed_out,
            global_timed_out,
        })
    }

    /// `start()`: PRE -> EXEC, no timer armed yet (`spec.md` §4.6).
    pub fn start(&mut self) -> bool {
        if self.base.phase != Phase::Pre {
            return false;
        }
        self.base.enter_exec_no_arm("Started, awaiting script");
        self.triple
            .set_benchmark_state(RefBoxState::ExecutingBenchmark, "");
        self.triple.set_goal_execution_state(RefBoxState::Ready, "");
        self.triple
            .set_manual_operation_state(RefBoxState::Ready, "");
        self.publish();
        true
    }

    /// Poll both timers; call at least once per beacon and per transmit tick.
    pub fn poll_timeouts(&mut self, now: Instant) {
        self.goal_timer.poll(now);
        self.global_timer.poll(now);
        if self.global_timed_out.swap(false, Ordering::SeqCst) {
            self.on_global_timeout(now);
        }
        if self.goal_timed_out.swap(false, Ordering::SeqCst) {
            self.on_goal_timeout(now);
        }
    }

    fn end_goal_execution(&mut self, now: Instant) {
        self.goal_timer.stop_pause(now);
        self.global_timer.stop_pause(now);
        self.current_goal_payload = None;
        self.current_goal_timeout = None;
    }

    /// `execute_goal(payload, timeout)` (`spec.md` §4.6).
    pub fn execute_goal(&mut self, now: Instant, payload: impl Into<String>, timeout_secs: f64) -> bool {
        let precondition = self.triple.benchmark_state == RefBoxState::ExecutingBenchmark
            && matches!(
                self.triple.goal_execution_state,
                RefBoxState::Ready | RefBoxState::GoalTimeout
            )
            && matches!(
                self.base.benchmark_state,
                BenchmarkState::Stop | BenchmarkState::WaitingResult
            );
        if !precondition {
            log::error!(
                "execute_goal rejected: benchmark_state={:?} goal_execution={:?} BenchmarkState={}",
                self.triple.benchmark_state,
                self.triple.goal_execution_state,
                self.base.benchmark_state
            );
            return false;
        }

        let payload = payload.into();
        log::info!(target: crate::log_paths::BMBOX_GOAL, "{payload} (timeout {timeout_secs}s)");
        self.current_goal_payload = Some(payload);
        self.current_goal_timeout = if timeout_secs > 0.0 {
            Some(Duration::from_secs_f64(timeout_secs))
        } else {
            None
        };

        self.global_timer.resume(now);
        let armed = select_goal_timeout(
            self.current_goal_timeout,
            self.base.event.benchmark.timeout,
            self.base.event.benchmark.total_timeout,
        );
        self.goal_timer.start_reset(now, Some(armed));

        self.base.benchmark_state = BenchmarkState::Prepare;
        self.triple
            .set_goal_execution_state(RefBoxState::TransmittingGoal, "");
        self.publish();
        true
    }

    /// The current goal payload, to be carried on the next outbound frame
    /// while `BenchmarkState == GOAL_TX` (`spec.md` §6 testable property 1).
    pub fn current_goal_payload(&self) -> Option<&str> {
        self.current_goal_payload.as_deref()
    }

    /// The goal handshake and beacon reaction table (`spec.md` §4.6).
    ///
    /// Switches on `BenchmarkState` first, matching the original's nested
    /// `switch (state_) { ... switch (msg.robot_state()) ... }` shape: a
    /// beacon whose `robot_state` doesn't match the one transition a given
    /// `BenchmarkState` is waiting for is a benign no-op (e.g. any beacon
    /// while `Stop`, or a repeated non-`Executing` beacon while `GoalTx`).
    /// Only an inconsistent `goal_execution_state` for the `BenchmarkState`
    /// we're in is an actual protocol error (remote).
    pub fn on_robot_state(&mut self, now: Instant, now_wall_ms: i64, frame: &RobotStateFrame) {
        self.beacon.record(now, now_wall_ms, frame);

        match self.base.benchmark_state {
            BenchmarkState::Stop => {}
            BenchmarkState::Prepare => {
                if frame.robot_state == RobotState::WaitingGoal {
                    if self.triple.goal_execution_state == RefBoxState::TransmittingGoal {
                        self.base.benchmark_state = BenchmarkState::GoalTx;
                    } else {
                        log::error!(
                            "protocol error (remote): BenchmarkState::Prepare and RobotState::WaitingGoal but goal_execution={:?}",
                            self.triple.goal_execution_state
                        );
                    }
                }
            }
            BenchmarkState::GoalTx => {
                if self.triple.goal_execution_state == RefBoxState::TransmittingGoal {
                    if frame.robot_state == RobotState::Executing {
                        self.base.benchmark_state = BenchmarkState::WaitingResult;
                        self.triple
                            .set_goal_execution_state(RefBoxState::ExecutingGoal, "");
                    }
                } else {
                    log::error!(
                        "protocol error (remote): BenchmarkState::GoalTx but goal_execution={:?}",
                        self.triple.goal_execution_state
                    );
                }
            }
            BenchmarkState::WaitingResult => {
                if !matches!(
                    self.triple.goal_execution_state,
                    RefBoxState::ExecutingGoal | RefBoxState::Ready | RefBoxState::GoalTimeout
                ) {
                    log::error!(
                        "protocol error (remote): BenchmarkState::WaitingResult but goal_execution={:?}",
                        self.triple.goal_execution_state
                    );
                }
                if self.triple.goal_execution_state == RefBoxState::ExecutingGoal
                    && frame.robot_state == RobotState::ResultTx
                {
                    let result = frame.generic_result.clone().unwrap_or_default();
                    self.triple.set_goal_execution_state(RefBoxState::Ready, result);
                    self.end_goal_execution(now);
                }
            }
        }
        self.publish();
    }

    fn on_goal_timeout(&mut self, now: Instant) {
        if self.base.phase != Phase::Exec {
            return;
        }
        self.triple
            .set_goal_execution_state(RefBoxState::GoalTimeout, "");
        self.base.benchmark_state = BenchmarkState::Stop;
        self.end_goal_execution(now);
        self.base.display.push_log("goal timeout");
        self.base.publish_timeout();
        self.publish();
    }

    fn on_global_timeout(&mut self, now: Instant) {
        if self.base.phase != Phase::Exec {
            return;
        }
        self.triple
            .set_benchmark_state(RefBoxState::GlobalTimeout, "");
        self.triple.set_manual_operation_state(RefBoxState::Ready, "");
        self.end_goal_execution(now);
        self.base.phase_post(now, "Stopped due to global timeout!");
        self.base.publish_timeout();
        self.publish();
    }

    /// `execute_manual_operation(prompt)` (`spec.md` §4.6).
    pub fn execute_manual_operation(&mut self, prompt: impl Into<String>) -> bool {
        if self.triple.manual_operation_state != RefBoxState::Ready {
            log::error!(
                "execute_manual_operation rejected: manual_operation={:?}",
                self.triple.manual_operation_state
            );
            return false;
        }
        let prompt = prompt.into();
        self.triple
            .set_manual_operation_state(RefBoxState::ExecutingManualOperation, prompt);
        self.publish();
        true
    }

    /// `manual_operation_complete(result)` (`spec.md` §4.6).
    pub fn manual_operation_complete(&mut self, result: impl Into<String>) -> bool {
        let precondition = matches!(
            self.base.benchmark_state,
            BenchmarkState::Prepare | BenchmarkState::Stop | BenchmarkState::WaitingResult
        ) && self.triple.manual_operation_state == RefBoxState::ExecutingManualOperation;
        if !precondition {
            log::error!(
                "manual_operation_complete rejected: BenchmarkState={} manual_operation={:?}",
                self.base.benchmark_state,
                self.triple.manual_operation_state
            );
            return false;
        }
        self.triple
            .set_manual_operation_state(RefBoxState::Ready, result.into());
        self.publish();
        true
    }

    /// `end_benchmark(score_string)` (`spec.md` §4.6): transitions to END and
    /// terminates via `phase_post`.
    pub fn end_benchmark(&mut self, now: Instant, score: impl Into<String>, shared: &SharedState) -> bool {
        let precondition = self.triple.benchmark_state == RefBoxState::ExecutingBenchmark
            && matches!(
                self.triple.goal_execution_state,
                RefBoxState::Ready | RefBoxState::GoalTimeout
            )
            && self.triple.manual_operation_state == RefBoxState::Ready;
        if !precondition {
            log::error!(
                "end_benchmark rejected: benchmark_state={:?} goal_execution={:?} manual_operation={:?}",
                self.triple.benchmark_state,
                self.triple.goal_execution_state,
                self.triple.manual_operation_state
            );
            return false;
        }
        let score = score.into();
        log::info!(target: crate::log_paths::BMBOX_SCORE, "{score}");
        self.triple.set_benchmark_state(RefBoxState::End, "");
        self.base
            .phase_post(now, &format!("Benchmark complete: {score}"));
        self.publish();
        self.terminate(shared);
        true
    }

    /// Referee stop while running (`spec.md` §4.6): unlike `end_benchmark`,
    /// this does not auto-terminate — `benchmark_state` becomes STOP, not
    /// END, and teardown is the event manager's responsibility.
    pub fn stop(&mut self, now: Instant) {
        self.triple.set_benchmark_state(RefBoxState::Stop, "");
        self.end_goal_execution(now);
        self.base.phase_post(now, "");
        self.publish();
    }

    fn terminate(&mut self, shared: &SharedState) {
        shared.unregister_benchmarking(&self.base.event.team);
    }

    fn publish(&self) {
        self.link.publish_refbox_state(&self.triple);
    }

    pub fn fill(&self, now: Instant) -> ZoneDisplay {
        let goal_remaining = self.goal_timer.get_until_timeout(now);
        let timer = self.base.timer_remaining_for_display(now, goal_remaining);
        let mut zd = self.base.fill_common(timer);
        zd.start_enabled = self.base.phase == Phase::Pre && self.link.script_connected();
        zd.stop_enabled = !zd.start_enabled;
        zd.manual_operation = self.triple.manual_operation_payload.clone();
        if let Some(warning) = self.link.multiple_publisher_warning() {
            zd.log.push(warning);
        }
        if !self.link.script_connected() {
            zd.log.push("Not connected".to_string());
        }
        zd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BenchmarkDescriptor;

    fn event(timeout_secs: u64, total_secs: u64) -> Event {
        Event {
            team: "alpha".into(),
            round: 1,
            run: 1,
            benchmark_code: "nav1".into(),
            benchmark: BenchmarkDescriptor {
                timeout: Duration::from_secs(timeout_secs),
                total_timeout: Duration::from_secs(total_secs),
                prefix: "x".into(),
                scoring: vec![],
            },
            password: "pw".into(),
            cipher_suite: "aes-128-cbc".into(),
        }
    }

    fn executor(timeout_secs: u64, total_secs: u64) -> ExternallyControlledExecutor {
        ExternallyControlledExecutor::new(
            event(timeout_secs, total_secs),
            100,
            Duration::from_secs(120),
        )
        .unwrap()
    }

    fn frame(robot_state: RobotState) -> RobotStateFrame {
        RobotStateFrame {
            robot_state,
            ..Default::default()
        }
    }

    #[test]
    fn goal_timeout_selection_is_pure() {
        assert_eq!(
            select_goal_timeout(Some(Duration::from_secs(10)), Duration::from_secs(60), Duration::from_secs(600)),
            Duration::from_secs(10)
        );
        assert_eq!(
            select_goal_timeout(None, Duration::from_secs(60), Duration::from_secs(600)),
            Duration::from_secs(60)
        );
        assert_eq!(
            select_goal_timeout(None, Duration::from_secs(700), Duration::from_secs(600)),
            Duration::from_secs(600)
        );
        assert_eq!(
            select_goal_timeout(Some(Duration::ZERO), Duration::from_secs(60), Duration::from_secs(600)),
            Duration::from_secs(60)
        );
    }

    /// S3: Externally-controlled happy path.
    #[test]
    fn happy_path_follows_the_documented_trajectory() {
        let shared = SharedState::new(10000, 100);
        let mut exec = executor(60, 600);
        let t0 = Instant::now();
        assert!(exec.start());
        assert_eq!(exec.triple.benchmark_state, RefBoxState::ExecutingBenchmark);
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::Ready);

        assert!(exec.execute_goal(t0, "g1", 10.0));
        assert_eq!(exec.goal_timer.duration(), Duration::from_secs(10));
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::TransmittingGoal);

        exec.on_robot_state(t0, 0, &frame(RobotState::WaitingGoal));
        assert_eq!(exec.base.benchmark_state, BenchmarkState::GoalTx);
        assert_eq!(exec.current_goal_payload(), Some("g1"));

        exec.on_robot_state(t0, 0, &frame(RobotState::Executing));
        assert_eq!(exec.base.benchmark_state, BenchmarkState::WaitingResult);
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::ExecutingGoal);

        let mut result_frame = frame(RobotState::ResultTx);
        result_frame.generic_result = Some("ok".to_string());
        exec.on_robot_state(t0, 0, &result_frame);
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::Ready);
        assert_eq!(exec.triple.goal_execution_payload, "ok");

        assert!(exec.end_benchmark(t0, "42/100", &shared));
        assert_eq!(exec.triple.benchmark_state, RefBoxState::End);
        assert_eq!(exec.base.phase, Phase::Post);
        assert!(!shared.is_benchmarking("alpha"));
    }

    /// S4: Partial goal timeout followed by retry.
    #[test]
    fn goal_timeout_then_retry_preserves_global_timer_progress() {
        let mut exec = executor(10, 600);
        let t0 = Instant::now();
        exec.start();
        exec.execute_goal(t0, "g1", 10.0);

        exec.poll_timeouts(t0 + Duration::from_millis(10_100));
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::GoalTimeout);
        assert_eq!(exec.base.benchmark_state, BenchmarkState::Stop);

        assert!(exec.execute_goal(t0 + Duration::from_millis(10_200), "g2", 5.0));
        assert_eq!(exec.goal_timer.duration(), Duration::from_secs(5));
        assert_eq!(exec.triple.goal_execution_state, RefBoxState::TransmittingGoal);
    }

    /// S5: Global timeout.
    #[test]
    fn global_timeout_ends_the_benchmark() {
        let mut exec = executor(60, 3);
        let mut timeout_rx = exec.base.subscribe_timeout();
        let t0 = Instant::now();
        exec.start();
        exec.execute_goal(t0, "g1", 0.0);

        exec.poll_timeouts(t0 + Duration::from_millis(3_100));
        assert_eq!(exec.triple.benchmark_state, RefBoxState::GlobalTimeout);
        assert_eq!(exec.base.phase, Phase::Post);
        assert_eq!(exec.triple.manual_operation_state, RefBoxState::Ready);
        assert!(timeout_rx.has_changed().unwrap(), "timeout_pub must fire");
        assert_eq!(*timeout_rx.borrow_and_update(), 1);

        exec.poll_timeouts(t0 + Duration::from_millis(3_200));
        assert!(
            !timeout_rx.has_changed().unwrap(),
            "timeout_pub must fire exactly once per arming"
        );
    }

    /// S6: Manual operation interleaved with a concurrent goal.
    #[test]
    fn manual_operation_is_independent_of_goal_execution() {
        let mut exec = executor(60, 600);
        let t0 = Instant::now();
        exec.start();

        assert!(exec.execute_manual_operation("check battery"));
        assert_eq!(
            exec.triple.manual_operation_state,
            RefBoxState::ExecutingManualOperation
        );

        assert!(exec.execute_goal(t0, "g1", 10.0), "goal precondition is independent of manual_operation");

        assert!(exec.manual_operation_complete("ok"));
        assert_eq!(exec.triple.manual_operation_state, RefBoxState::Ready);
        assert_eq!(exec.triple.manual_operation_payload, "ok");
    }

    #[test]
    fn execute_goal_rejected_outside_precondition() {
        let mut exec = executor(60, 600);
        assert!(!exec.execute_goal(Instant::now(), "g1", 10.0), "benchmark not started yet");
    }

    #[test]
    fn referee_stop_does_not_auto_terminate() {
        let mut exec = executor(60, 600);
        let t0 = Instant::now();
        exec.start();
        exec.execute_goal(t0, "g1", 10.0);
        exec.stop(t0);
        assert_eq!(exec.triple.benchmark_state, RefBoxState::Stop);
        assert_eq!(exec.base.phase, Phase::Post);
    }
}
