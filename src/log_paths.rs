//! Structured log record paths (`spec.md` §6: "Log records. Structured
//! entries keyed by path"). Each path is used as a `log` crate `target` so a
//! host's subscriber can route/filter these the same way it would any other
//! module path, without this crate inventing its own structured-logging
//! sink (pattern grounded in `examples/nextest-rs-nextest`'s
//! `log::error!(target: "cargo_nextest::no_heading", ...)` use of custom
//! targets for routing, rather than module-path targets).

pub const SCORE: &str = "/rsbb_log/score";
pub const REFBOX_STATE: &str = "/rsbb_log/refbox_state";
pub const REFBOX_STATE_PAYLOAD: &str = "/rsbb_log/refbox_state_payload";
pub const BMBOX_GOAL: &str = "/rsbb_log/bmbox/goal";
pub const BMBOX_SCORE: &str = "/rsbb_log/bmbox/score";
pub const TABLET_DISPLAY_MAP: &str = "/rsbb_log/tablet/display_map";

/// `/rsbb_log/devices/*`: one target per HCFGAC device field.
pub fn device_path(field: &str) -> String {
    format!("/rsbb_log/devices/{field}")
}
