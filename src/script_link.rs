//! C3 — Script Link: the advertised request/response services plus the
//! latched `refbox_state` publish and `bmbox_state` subscription used by
//! the externally-controlled executor (C6) to coordinate with the script.

use crate::error::{CoreError, CoreResult};
use crate::executor::RefBoxStateTriple;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(200);

/// Owns the latched `refbox_state` publish and the `bmbox_state`
/// subscription for one executor's script prefix.
pub struct ScriptLink {
    prefix: String,
    refbox_state_tx: watch::Sender<RefBoxStateTriple>,
    bmbox_publisher_count: AtomicUsize,
}

impl ScriptLink {
    /// Fails hard at construction if `prefix` is empty (`spec.md` §4.3: "If
    /// the event's prefix is empty, the executor is not runnable and must
    /// fail hard at construction").
    pub fn new(prefix: impl Into<String>, initial: RefBoxStateTriple) -> CoreResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(CoreError::config(
                "externally-controlled executor requires a non-empty script prefix",
            ));
        }
        let (refbox_state_tx, _rx) = watch::channel(initial);
        Ok(Self {
            prefix,
            refbox_state_tx,
            bmbox_publisher_count: AtomicUsize::new(0),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic_refbox_state(&self) -> String {
        format!("{}/refbox_state", self.prefix)
    }

    pub fn topic_bmbox_state(&self) -> String {
        format!("{}/bmbox_state", self.prefix)
    }

    pub fn service_execute_manual_operation(&self) -> String {
        format!("{}/execute_manual_operation", self.prefix)
    }

    pub fn service_execute_goal(&self) -> String {
        format!("{}/execute_goal", self.prefix)
    }

    pub fn service_end_benchmark(&self) -> String {
        format!("{}/end_benchmark", self.prefix)
    }

    /// Publishes only if the triple actually changed (`SPEC_FULL.md` §3/§8
    /// property 10): a no-op publish is suppressed on the latched channel.
    pub fn publish_refbox_state(&self, triple: &RefBoxStateTriple) {
        let changed = *self.refbox_state_tx.borrow() != *triple;
        if changed {
            let _ = self.refbox_state_tx.send(triple.clone());
        }
    }

    pub fn refbox_state(&self) -> RefBoxStateTriple {
        self.refbox_state_tx.borrow().clone()
    }

    pub fn subscribe_refbox_state(&self) -> watch::Receiver<RefBoxStateTriple> {
        self.refbox_state_tx.subscribe()
    }

    /// The transport layer calls this when a new `bmbox_state` publisher
    /// connects/disconnects; the "script connected" predicate (`spec.md`
    /// §4.3) is purely a function of this count.
    pub fn note_publisher_connected(&self) {
        self.bmbox_publisher_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn note_publisher_disconnected(&self) {
        self.bmbox_publisher_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_sub(1))
            })
            .ok();
    }

    pub fn script_connected(&self) -> bool {
        self.bmbox_publisher_count.load(Ordering::SeqCst) >= 1
    }

    /// `spec.md` §4.3: more than one publisher on `bmbox_state` is a
    /// surfaced warning, not an error.
    pub fn multiple_publisher_warning(&self) -> Option<String> {
        if self.bmbox_publisher_count.load(Ordering::SeqCst) > 1 {
            Some("WARNING: multiple bmbox_state publishers detected".to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RefBoxState;

    #[test]
    fn empty_prefix_fails_at_construction() {
        let err = ScriptLink::new("", RefBoxStateTriple::initial()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn connected_predicate_tracks_publisher_count() {
        let link = ScriptLink::new("x", RefBoxStateTriple::initial()).unwrap();
        assert!(!link.script_connected());
        link.note_publisher_connected();
        assert!(link.script_connected());
        assert!(link.multiple_publisher_warning().is_none());
        link.note_publisher_connected();
        assert!(link.multiple_publisher_warning().is_some());
        link.note_publisher_disconnected();
        link.note_publisher_disconnected();
        assert!(!link.script_connected());
    }

    #[test]
    fn publish_suppressed_when_triple_unchanged() {
        let link = ScriptLink::new("x", RefBoxStateTriple::initial()).unwrap();
        let mut rx = link.subscribe_refbox_state();
        let initial = RefBoxStateTriple::initial();
        link.publish_refbox_state(&initial);
        assert!(!rx.has_changed().unwrap());

        let mut changed = initial.clone();
        changed.set_benchmark_state(RefBoxState::ExecutingBenchmark, "");
        link.publish_refbox_state(&changed);
        assert!(rx.has_changed().unwrap());
    }
}
