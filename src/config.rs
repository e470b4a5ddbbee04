//! Process-wide configuration knobs (`spec.md` §6). Loading the file itself
//! is an external collaborator's job; this module only owns the struct,
//! its defaults, and `toml` (de)serialization.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_display_log_size() -> usize {
    3000
}

fn default_after_stop_duration_secs() -> f64 {
    120.0
}

fn default_rsbb_host() -> String {
    "10.255.255.255".to_string()
}

fn default_rsbb_cypher() -> String {
    "aes-128-cbc".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_display_log_size")]
    pub display_log_size: usize,
    #[serde(default = "default_after_stop_duration_secs")]
    pub after_stop_duration_secs: f64,
    #[serde(default = "default_rsbb_host")]
    pub rsbb_host: String,
    #[serde(default = "default_rsbb_cypher")]
    pub rsbb_cypher: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            display_log_size: default_display_log_size(),
            after_stop_duration_secs: default_after_stop_duration_secs(),
            rsbb_host: default_rsbb_host(),
            rsbb_cypher: default_rsbb_cypher(),
        }
    }
}

impl CoreConfig {
    pub fn after_stop_duration(&self) -> Duration {
        Duration::from_secs_f64(self.after_stop_duration_secs)
    }

    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_param_direct_values() {
        let config = CoreConfig::default();
        assert_eq!(config.display_log_size, 3000);
        assert_eq!(config.after_stop_duration(), Duration::from_secs(120));
        assert_eq!(config.rsbb_host, "10.255.255.255");
        assert_eq!(config.rsbb_cypher, "aes-128-cbc");
    }

    #[test]
    fn partial_toml_fills_in_remaining_defaults() {
        let config = CoreConfig::from_toml_str("rsbb_host = \"192.168.1.1\"\n").unwrap();
        assert_eq!(config.rsbb_host, "192.168.1.1");
        assert_eq!(config.display_log_size, 3000);
    }
}
