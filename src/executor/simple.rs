//! C5 — Simple Executor: drives a single robot with no script in the loop,
//! plus the HCFGAC device-mirroring variant.

use super::{ExecutorBase, Phase};
use crate::display::ZoneDisplay;
use crate::error::CoreResult;
use crate::event::Event;
use crate::secure_channel::{BeaconTracker, BenchmarkState, DedupeSink, RobotState, RobotStateFrame};
use crate::shared_state::SharedState;
use crate::timer::TimeControl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The device fields an HCFGAC robot mirrors to local actuators
/// (`spec.md` §4.2).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFields {
    pub switch_1: Option<bool>,
    pub switch_2: Option<bool>,
    pub switch_3: Option<bool>,
    pub blinds: Option<u8>,
    pub dimmer: Option<u8>,
    pub tablet_display_map: Option<bool>,
}

impl DeviceFields {
    fn from_frame(frame: &RobotStateFrame) -> Self {
        Self {
            switch_1: frame.switch_1,
            switch_2: frame.switch_2,
            switch_3: frame.switch_3,
            blinds: frame.blinds,
            dimmer: frame.dimmer,
            tablet_display_map: frame.tablet_display_map,
        }
    }
}

/// External collaborator for HCFGAC device mirroring (`spec.md` §1 Out of
/// scope: "ancillary home-automation device bridging").
pub trait DeviceActuator: Send + Sync {
    fn set_switch(&self, index: u8, on: bool);
    fn set_blinds(&self, pct: u8);
    fn set_dimmer(&self, pct: u8);
    fn set_tablet_display_map(&self, show: bool);
}

pub struct SimpleExecutor {
    pub base: ExecutorBase,
    pub timer: TimeControl,
    pub beacon: BeaconTracker,
    pub notifications: DedupeSink,
    pub activation_event: DedupeSink,
    pub visitor: DedupeSink,
    pub final_command: DedupeSink,
    last_devices: DeviceFields,
    device_actuator: Option<Box<dyn DeviceActuator>>,
    port: u16,
    robot_name: String,
}

impl SimpleExecutor {
    pub fn new(
        event: Event,
        robot_name: impl Into<String>,
        port: u16,
        display_log_size: usize,
        after_stop_duration: std::time::Duration,
        timed_out: Arc<AtomicBool>,
        device_actuator: Option<Box<dyn DeviceActuator>>,
    ) -> Self {
        let timer = TimeControl::new(event.benchmark.timeout, true, move || {
            timed_out.store(true, Ordering::SeqCst);
        });
        Self {
            base: ExecutorBase::new(event, display_log_size, after_stop_duration),
            timer,
            beacon: BeaconTracker::default(),
            notifications: DedupeSink::default(),
            activation_event: DedupeSink::default(),
            visitor: DedupeSink::default(),
            final_command: DedupeSink::default(),
            last_devices: DeviceFields::default(),
            device_actuator,
            port,
            robot_name: robot_name.into(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn robot_name(&self) -> &str {
        &self.robot_name
    }

    pub fn register(&self, shared: &SharedState) -> CoreResult<()> {
        shared.register_benchmarking(&self.base.event.team, &self.robot_name, self.port)
    }

    /// `start()`: BenchmarkState must be STOP, else ignored (`spec.md` §4.4).
    pub fn start(&mut self, now: Instant) -> bool {
        if self.base.benchmark_state != BenchmarkState::Stop {
            return false;
        }
        match self.base.phase {
            Phase::Pre => self.timer.start_reset(now, None),
            Phase::Post => self.timer.resume_hot(now),
            Phase::Exec => {}
        }
        self.base.phase_exec("Started");
        true
    }

    /// `stop()`: terminates if already STOP, otherwise enters POST
    /// (`spec.md` §4.4). Returns true if this call terminated the executor.
    pub fn stop(&mut self, now: Instant, shared: &SharedState) -> bool {
        if self.base.benchmark_state == BenchmarkState::Stop {
            shared.unregister_benchmarking(&self.base.event.team);
            true
        } else {
            self.base.phase_post(now, "Benchmark Stopped by referee");
            self.timer.stop_pause(now);
            false
        }
    }

    /// Polls the goal timer; must be called at least once per beacon and
    /// once per transmit tick (`spec.md` §4.1).
    pub fn poll_timeout(&mut self, now: Instant) {
        self.timer.poll(now);
    }

    pub fn on_goal_timeout(&mut self, now: Instant) {
        if self.base.phase != Phase::Exec {
            return;
        }
        self.base.timed_out = true;
        self.base.phase_post(now, "Stopped due to timeout!");
        self.base.publish_timeout();
    }

    /// Terminates the executor on an internal invariant violation
    /// (`spec.md` §7: "Internal invariant violation ... terminate the
    /// run"), distinct from an ordinary POST transition: the goal timer is
    /// paused and the team is removed from the shared benchmarking
    /// registry so it isn't left stuck there.
    fn terminate(&mut self, now: Instant, shared: &SharedState) {
        self.timer.stop_pause(now);
        shared.unregister_benchmarking(&self.base.event.team);
    }

    /// The reaction table of `spec.md` §4.5.
    pub fn on_robot_state(
        &mut self,
        now: Instant,
        now_wall_ms: i64,
        frame: &RobotStateFrame,
        shared: &SharedState,
    ) {
        self.beacon.record(now, now_wall_ms, frame);

        for (sink, bundle) in [
            (&mut self.notifications, &frame.notifications),
            (&mut self.activation_event, &frame.activation_event),
            (&mut self.visitor, &frame.visitor),
            (&mut self.final_command, &frame.final_command),
        ] {
            if let Some(bundle) = bundle {
                if sink.offer(bundle) {
                    self.base.display.push_online(bundle.payload.clone());
                }
            }
        }

        match (self.base.benchmark_state, frame.robot_state) {
            (BenchmarkState::Stop, _) => {}
            (BenchmarkState::Prepare, RobotState::WaitingGoal) => {
                self.base.benchmark_state = BenchmarkState::WaitingResult;
                self.base.display.push_log("no explicit goal");
            }
            (BenchmarkState::GoalTx, _) => {
                log::error!(
                    "internal invariant violated: SimpleExecutor observed GOAL_TX for team {}",
                    self.base.event.team
                );
                self.base.timed_out = false;
                self.base.phase_post(now, "Internal error: unexpected GOAL_TX state");
                self.terminate(now, shared);
            }
            (BenchmarkState::WaitingResult, RobotState::Stop | RobotState::Preparing) => {
                if self.base.phase == Phase::Post {
                    self.timer.resume_hot(now);
                }
                self.base.phase_exec("retrying from prepare");
            }
            (BenchmarkState::WaitingResult, RobotState::WaitingGoal | RobotState::Executing) => {}
            (BenchmarkState::WaitingResult, RobotState::ResultTx) => {
                self.base.phase_post(now, "Benchmark completed by the robot");
                self.timer.stop_pause(now);
            }
        }

        self.mirror_devices(frame);
    }

    fn mirror_devices(&mut self, frame: &RobotStateFrame) {
        let incoming = DeviceFields::from_frame(frame);
        let actuator = match self.device_actuator.as_ref() {
            Some(actuator) => actuator,
            None => return,
        };

        if let Some(v) = incoming.switch_1.filter(|v| Some(*v) != self.last_devices.switch_1) {
            actuator.set_switch(1, v);
            log::info!(target: &crate::log_paths::device_path("switch_1"), "{v}");
            self.base.display.push_log(format!("switch_1 -> {v}"));
        }
        if let Some(v) = incoming.switch_2.filter(|v| Some(*v) != self.last_devices.switch_2) {
            actuator.set_switch(2, v);
            log::info!(target: &crate::log_paths::device_path("switch_2"), "{v}");
            self.base.display.push_log(format!("switch_2 -> {v}"));
        }
        if let Some(v) = incoming.switch_3.filter(|v| Some(*v) != self.last_devices.switch_3) {
            actuator.set_switch(3, v);
            log::info!(target: &crate::log_paths::device_path("switch_3"), "{v}");
            self.base.display.push_log(format!("switch_3 -> {v}"));
        }
        if let Some(v) = incoming.blinds.filter(|v| Some(*v) != self.last_devices.blinds) {
            actuator.set_blinds(v);
            log::info!(target: &crate::log_paths::device_path("blinds"), "{v}");
            self.base.display.push_log(format!("blinds -> {v}"));
        }
        if let Some(v) = incoming.dimmer.filter(|v| Some(*v) != self.last_devices.dimmer) {
            actuator.set_dimmer(v);
            log::info!(target: &crate::log_paths::device_path("dimmer"), "{v}");
            self.base.display.push_log(format!("dimmer -> {v}"));
        }
        if let Some(v) = incoming
            .tablet_display_map
            .filter(|v| Some(*v) != self.last_devices.tablet_display_map)
        {
            actuator.set_tablet_display_map(v);
            log::info!(target: crate::log_paths::TABLET_DISPLAY_MAP, "{v}");
            self.base.display.push_log(format!("tablet_display_map -> {v}"));
        }

        self.last_devices = incoming;
    }

    /// `fill()` plus the Simple Executor's display augmentation
    /// (`spec.md` §4.5): messages-saved line and skew/staleness warnings.
    pub fn fill(&self, now: Instant) -> ZoneDisplay {
        let timer = self
            .base
            .timer_remaining_for_display(now, self.timer.get_until_timeout(now));
        let mut zd = self.base.fill_common(timer);
        zd.start_enabled = self.base.benchmark_state == BenchmarkState::Stop;
        zd.stop_enabled = !zd.start_enabled;
        zd.online_data
            .push(format!("Messages saved: {}", self.beacon.messages_saved));
        if let Some(warning) = self.beacon.skew_warning() {
            zd.log.push(warning);
        }
        if let Some(warning) = self.beacon.staleness_warning(now) {
            zd.log.push(warning);
        }
        zd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BenchmarkDescriptor;
    use std::time::Duration;

    fn event(timeout_secs: u64) -> Event {
        Event {
            team: "alpha".into(),
            round: 1,
            run: 1,
            benchmark_code: "nav1".into(),
            benchmark: BenchmarkDescriptor {
                timeout: Duration::from_secs(timeout_secs),
                total_timeout: Duration::from_secs(timeout_secs * 10),
                prefix: String::new(),
                scoring: vec![],
            },
            password: "pw".into(),
            cipher_suite: "aes-128-cbc".into(),
        }
    }

    fn executor(timeout_secs: u64) -> (SimpleExecutor, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        let exec = SimpleExecutor::new(
            event(timeout_secs),
            "robot1",
            10000,
            100,
            Duration::from_secs(120),
            flag.clone(),
            None,
        );
        (exec, flag)
    }

    fn frame(robot_state: RobotState, t: i64) -> RobotStateFrame {
        RobotStateFrame {
            time: t,
            robot_state,
            ..Default::default()
        }
    }

    /// S1: Simple completion.
    #[test]
    fn simple_completion_follows_the_documented_trajectory() {
        let shared = SharedState::new(10000, 100);
        let (mut exec, _) = executor(300);
        let t0 = Instant::now();
        assert!(exec.start(t0));
        assert_eq!(exec.base.benchmark_state, BenchmarkState::Prepare);

        exec.on_robot_state(t0, 0, &frame(RobotState::Preparing, 0), &shared);
        assert_eq!(exec.base.benchmark_state, BenchmarkState::Prepare);

        exec.on_robot_state(t0, 0, &frame(RobotState::WaitingGoal, 0), &shared);
        assert_eq!(exec.base.benchmark_state, BenchmarkState::WaitingResult);

        exec.on_robot_state(t0, 0, &frame(RobotState::Executing, 0), &shared);
        assert_eq!(exec.base.benchmark_state, BenchmarkState::WaitingResult);

        exec.on_robot_state(t0, 0, &frame(RobotState::ResultTx, 0), &shared);
        assert_eq!(exec.base.benchmark_state, BenchmarkState::Stop);
        assert_eq!(exec.base.phase, Phase::Post);
        assert_eq!(exec.base.state_description, "Benchmark completed by the robot");
    }

    /// S2: Simple timeout.
    #[test]
    fn simple_timeout_fires_exactly_once() {
        let (mut exec, flag) = executor(1);
        let mut timeout_rx = exec.base.subscribe_timeout();
        let t0 = Instant::now();
        exec.start(t0);
        exec.poll_timeout(t0 + Duration::from_millis(1100));
        assert!(flag.load(Ordering::SeqCst));
        exec.on_goal_timeout(t0 + Duration::from_millis(1100));
        assert_eq!(exec.base.benchmark_state, BenchmarkState::Stop);
        assert_eq!(exec.base.phase, Phase::Post);
        assert_eq!(exec.base.state_description, "Stopped due to timeout!");
        assert!(timeout_rx.has_changed().unwrap(), "timeout_pub must fire");
        assert_eq!(*timeout_rx.borrow_and_update(), 1);

        flag.store(false, Ordering::SeqCst);
        exec.poll_timeout(t0 + Duration::from_millis(2000));
        assert!(!flag.load(Ordering::SeqCst), "timer must not fire twice for one arming");

        exec.on_goal_timeout(t0 + Duration::from_millis(2000));
        assert!(
            !timeout_rx.has_changed().unwrap(),
            "timeout_pub must fire exactly once per arming, not again while already in POST"
        );
    }

    #[test]
    fn goal_tx_observed_is_an_internal_invariant_violation_and_terminates() {
        let shared = SharedState::new(10000, 100);
        let (mut exec, _) = executor(300);
        let t0 = Instant::now();
        exec.start(t0);
        exec.register(&shared).unwrap();
        exec.base.benchmark_state = BenchmarkState::GoalTx;
        exec.on_robot_state(t0, 0, &frame(RobotState::Executing, 0), &shared);
        assert_eq!(exec.base.phase, Phase::Post);
        assert!(!exec.timer.is_running(), "goal timer must be paused on termination");
        assert!(
            !shared.is_benchmarking("alpha"),
            "team must be removed from the shared benchmarking registry"
        );
    }

    #[test]
    fn start_ignored_unless_benchmark_state_is_stop() {
        let (mut exec, _) = executor(300);
        let t0 = Instant::now();
        assert!(exec.start(t0));
        assert!(!exec.start(t0), "second start while running must be ignored");
    }
}
