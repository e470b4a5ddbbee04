//! C7 — All-Robots Executor: fan-out wrapper spawning one Simple Executor
//! per active robot (`spec.md` §4.7).

use super::simple::SimpleExecutor;
use crate::display::ZoneDisplay;
use crate::event::Event;
use crate::secure_channel::{BenchmarkState, SecureChannel};
use crate::shared_state::SharedState;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BIND_ATTEMPTS: u32 = 8;

struct Child {
    executor: SimpleExecutor,
    channel: Arc<SecureChannel>,
}

pub struct AllRobotsExecutor {
    children: Vec<Child>,
    benchmark_state: BenchmarkState,
    after_stop_duration: Duration,
    last_stop_time: Option<Instant>,
}

impl AllRobotsExecutor {
    /// Constructs one Simple Executor per active robot whose team is not
    /// already benchmarking, cloning `template` per team (`spec.md` §4.7).
    /// A robot whose channel cannot be bound after `BIND_ATTEMPTS` retries
    /// is skipped with a logged warning rather than failing the whole fleet.
    pub async fn new(
        shared: &SharedState,
        template: &Event,
        display_log_size: usize,
        after_stop_duration: Duration,
    ) -> Self {
        let mut children = Vec::new();
        for (team, record) in shared.active_robots_snapshot() {
            if shared.is_benchmarking(&team) {
                continue;
            }
            let event = template.for_team(&team);
            let channel = match SecureChannel::bind(
                shared,
                &event.cipher_suite,
                &event.password,
                0,
                BIND_ATTEMPTS,
            )
            .await
            {
                Ok(channel) => Arc::new(channel),
                Err(e) => {
                    log::warn!("all-robots: skipping team {team}: {e}");
                    continue;
                }
            };
            let executor = SimpleExecutor::new(
                event,
                record.robot_name.clone(),
                channel.port(),
                display_log_size,
                after_stop_duration,
                Arc::new(AtomicBool::new(false)),
                None,
            );
            if executor.register(shared).is_err() {
                log::warn!("all-robots: team {team} became benchmarking concurrently, skipping");
                continue;
            }
            children.push(Child { executor, channel });
        }
        Self {
            children,
            benchmark_state: BenchmarkState::Stop,
            after_stop_duration,
            last_stop_time: None,
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &Arc<SecureChannel>> {
        self.children.iter().map(|c| &c.channel)
    }

    /// Forwards `start` to every child; the aggregate's own BenchmarkState
    /// becomes WAITING_RESULT once children are started (`spec.md` §4.7).
    pub fn start(&mut self, now: Instant) {
        for child in &mut self.children {
            child.executor.start(now);
        }
        self.benchmark_state = BenchmarkState::WaitingResult;
        self.last_stop_time = None;
    }

    /// Stops every child together and arms the aggregate's own post-hoc
    /// settling-window display timer (`spec.md` §4.4's `after_stop_duration`
    /// window, mirrored here for the fleet as a whole).
    pub fn stop_communication(&mut self, now: Instant, shared: &SharedState) {
        for child in &mut self.children {
            child.executor.stop(now, shared);
        }
        self.benchmark_state = BenchmarkState::Stop;
        self.last_stop_time = Some(now);
    }

    pub fn child_mut(&mut self, robot_name: &str) -> Option<&mut SimpleExecutor> {
        self.children
            .iter_mut()
            .map(|c| &mut c.executor)
            .find(|e| e.robot_name() == robot_name)
    }

    /// Aggregates child counts into three display lines grouped by the
    /// shared tri-state {STOP, PREPARE∪GOAL_TX, WAITING_RESULT}
    /// (`spec.md` §4.7).
    pub fn fill(&self, now: Instant) -> ZoneDisplay {
        let mut stopped = 0usize;
        let mut preparing = 0usize;
        let mut waiting_result = 0usize;
        for child in &self.children {
            match child.executor.base.benchmark_state {
                BenchmarkState::Stop => stopped += 1,
                BenchmarkState::Prepare | BenchmarkState::GoalTx => preparing += 1,
                BenchmarkState::WaitingResult => waiting_result += 1,
            }
        }
        let timer = match self.last_stop_time {
            Some(t) => self
                .after_stop_duration
                .saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        };
        ZoneDisplay {
            timer,
            state: format!("{} robots", self.children.len()),
            manual_operation: String::new(),
            start_enabled: self.benchmark_state == BenchmarkState::Stop,
            stop_enabled: self.benchmark_state != BenchmarkState::Stop,
            log: vec![
                format!("Stopped: {stopped}"),
                format!("Preparing: {preparing}"),
                format!("Waiting result: {waiting_result}"),
            ],
            online_data: vec![],
            scoring: vec![],
        }
    }
}
