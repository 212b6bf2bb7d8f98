use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All engine timing knobs, in milliseconds on the wire so a host can ship
/// the struct as plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a job may sit in `Preparing` before the engine assumes the
    /// command was lost and resets the control.
    pub prepare_timeout_ms: u64,
    /// Cadence of the staleness sweep over downloading jobs.
    pub sweep_interval_ms: u64,
    /// Idle time after which a downloading control is flagged "may be stuck".
    pub stall_warn_after_ms: u64,
    /// Idle time after which the engine assumes the worker finished but the
    /// final message was lost, and forces completion.
    pub assume_done_after_ms: u64,
    /// How long a completed control keeps its success styling before reset.
    pub downloaded_cooldown_ms: u64,
    /// How long an errored control keeps its error styling before reset.
    pub error_cooldown_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prepare_timeout_ms: 10_000,
            sweep_interval_ms: 5_000,
            stall_warn_after_ms: 30_000,
            assume_done_after_ms: 120_000,
            downloaded_cooldown_ms: 5_000,
            error_cooldown_ms: 15_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn stall_warn_after(&self) -> Duration {
        Duration::from_millis(self.stall_warn_after_ms)
    }

    pub fn assume_done_after(&self) -> Duration {
        Duration::from_millis(self.assume_done_after_ms)
    }

    pub fn downloaded_cooldown(&self) -> Duration {
        Duration::from_millis(self.downloaded_cooldown_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_warn_below_forced_completion() {
        let cfg = EngineConfig::default();
        assert!(cfg.stall_warn_after() < cfg.assume_done_after());
        assert!(cfg.sweep_interval() < cfg.stall_warn_after());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "prepare_timeout_ms": 500 }"#).unwrap();
        assert_eq!(cfg.prepare_timeout(), Duration::from_millis(500));
        assert_eq!(
            cfg.sweep_interval(),
            EngineConfig::default().sweep_interval()
        );
    }
}
