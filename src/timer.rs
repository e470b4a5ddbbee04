//! C1 — Time Control: a recurring countdown, driven entirely by an
//! explicit `Instant` passed at each call so it never reads the wall clock
//! itself. That makes the whole timer discipline testable with synthetic
//! clocks instead of real sleeps (see `SPEC_FULL.md` §8).

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A countdown with start/reset, resume, resume-hot, pause, and a callback
/// fired at most once per arming when it reaches zero while running.
#[derive(Clone)]
pub struct TimeControl {
    duration: Duration,
    elapsed_at_pause: Duration,
    start_instant: Option<Instant>,
    running: bool,
    fired: bool,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl TimeControl {
    /// `autostart` immediately arms the timer against the wall clock at
    /// construction time; every other operation takes an explicit `now`.
    pub fn new(
        initial_duration: Duration,
        autostart: bool,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let mut timer = Self {
            duration: initial_duration,
            elapsed_at_pause: Duration::ZERO,
            start_instant: None,
            running: false,
            fired: false,
            callback: Arc::new(callback),
        };
        if autostart {
            timer.start_reset(Instant::now(), None);
        }
        timer
    }

    /// Restarts the countdown from zero elapsed, optionally changing the
    /// configured duration. Re-arms the callback.
    pub fn start_reset(&mut self, now: Instant, duration: Option<Duration>) {
        if let Some(d) = duration {
            self.duration = d;
        }
        self.elapsed_at_pause = Duration::ZERO;
        self.start_instant = Some(now);
        self.running = true;
        self.fired = false;
    }

    /// Continues from wherever the timer was paused, without altering the
    /// duration or re-arming the callback if it already fired.
    pub fn resume(&mut self, now: Instant) {
        self.start_instant = Some(now.checked_sub(self.elapsed_at_pause).unwrap_or(now));
        self.running = true;
    }

    /// Like `resume`, but also re-arms the callback so it can fire again.
    pub fn resume_hot(&mut self, now: Instant) {
        self.resume(now);
        self.fired = false;
    }

    /// Idempotent: pausing an already-paused timer is a no-op.
    pub fn stop_pause(&mut self, now: Instant) {
        if self.running {
            self.elapsed_at_pause = self.get_elapsed(now);
            self.start_instant = None;
            self.running = false;
        }
    }

    pub fn get_elapsed(&self, now: Instant) -> Duration {
        match self.start_instant {
            Some(start) if self.running => now.saturating_duration_since(start),
            _ => self.elapsed_at_pause,
        }
    }

    /// A never-started timer returns the configured initial duration.
    pub fn get_until_timeout(&self, now: Instant) -> Duration {
        self.duration.saturating_sub(self.get_elapsed(now))
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Must be polled periodically by the owning executor (once per beacon
    /// or transmit tick is sufficient); invokes the callback exactly once
    /// per arming once the countdown reaches zero while running.
    pub fn poll(&mut self, now: Instant) {
        if self.running && !self.fired && self.get_elapsed(now) >= self.duration {
            self.fired = true;
            (self.callback)();
        }
    }
}

impl std::fmt::Debug for TimeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeControl")
            .field("duration", &self.duration)
            .field("running", &self.running)
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(duration: Duration) -> (TimeControl, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let timer = TimeControl::new(duration, false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (timer, count)
    }

    #[test]
    fn never_started_timer_reports_initial_duration() {
        let (timer, _) = counting_timer(Duration::from_secs(10));
        let now = Instant::now();
        assert_eq!(timer.get_until_timeout(now), Duration::from_secs(10));
        assert_eq!(timer.get_elapsed(now), Duration::ZERO);
    }

    #[test]
    fn fires_callback_exactly_once_per_arming() {
        let (mut timer, count) = counting_timer(Duration::from_millis(10));
        let t0 = Instant::now();
        timer.start_reset(t0, None);
        timer.poll(t0 + Duration::from_millis(20));
        timer.poll(t0 + Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resume_hot_rearms_but_plain_resume_does_not() {
        let (mut timer, count) = counting_timer(Duration::from_millis(10));
        let t0 = Instant::now();
        timer.start_reset(t0, None);
        timer.poll(t0 + Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        timer.stop_pause(t0 + Duration::from_millis(20));
        timer.resume(t0 + Duration::from_millis(25));
        timer.poll(t0 + Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), 1, "plain resume must not re-arm");

        timer.stop_pause(t0 + Duration::from_millis(40));
        timer.resume_hot(t0 + Duration::from_millis(41));
        timer.poll(t0 + Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 2, "resume_hot must re-arm");
    }

    #[test]
    fn stop_pause_is_idempotent() {
        let (mut timer, _) = counting_timer(Duration::from_secs(5));
        let t0 = Instant::now();
        timer.start_reset(t0, None);
        timer.stop_pause(t0 + Duration::from_secs(2));
        let elapsed_after_first = timer.get_elapsed(t0 + Duration::from_secs(2));
        timer.stop_pause(t0 + Duration::from_secs(4));
        let elapsed_after_second = timer.get_elapsed(t0 + Duration::from_secs(4));
        assert_eq!(elapsed_after_first, elapsed_after_second);
    }

    #[test]
    fn start_reset_restarts_from_the_new_duration() {
        let (mut timer, _) = counting_timer(Duration::from_secs(5));
        let t0 = Instant::now();
        timer.start_reset(t0, None);
        timer.start_reset(t0 + Duration::from_secs(3), Some(Duration::from_secs(5)));
        assert_eq!(
            timer.get_until_timeout(t0 + Duration::from_secs(3)),
            Duration::from_secs(5)
        );
    }
}
