// Pipeline tunables

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// How the scheduler decides which snapshots to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowPolicy {
    /// Smooth the whole queue after every push, render the head once more
    /// than `n_lookup` snapshots are buffered.
    Simple,
    /// Expanding window during startup, then a fixed backup + lookahead
    /// window once steady state is reached.
    #[default]
    TwoTierBackup,
}

impl FromStr for WindowPolicy {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(WindowPolicy::Simple),
            "two-tier-backup" | "two-tier" | "backup" => Ok(WindowPolicy::TwoTierBackup),
            other => Err(SynthError::InvalidConfig(format!(
                "unknown window policy {other:?} (expected simple or two-tier-backup)"
            ))),
        }
    }
}

impl fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPolicy::Simple => f.write_str("simple"),
            WindowPolicy::TwoTierBackup => f.write_str("two-tier-backup"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_label_queue_len: usize,
    pub max_model_queue_len: usize,
    pub max_frame_queue_len: usize,
    pub n_lookup: usize,
    pub n_backup: usize,
    pub policy: WindowPolicy,
    /// Upper bound on how long the continuous worker sleeps between checks.
    pub idle_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_label_queue_len: 512,
            max_model_queue_len: 16,
            max_frame_queue_len: 4096,
            n_lookup: 1,
            n_backup: 2,
            policy: WindowPolicy::TwoTierBackup,
            idle_delay_ms: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_label_queue_len = std::env::var("SYNTH_MAX_LABEL_QUEUE_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_label_queue_len);

        let max_model_queue_len = std::env::var("SYNTH_MAX_MODEL_QUEUE_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_model_queue_len);

        let max_frame_queue_len = std::env::var("SYNTH_MAX_FRAME_QUEUE_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_frame_queue_len);

        let n_lookup = std::env::var("SYNTH_N_LOOKUP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.n_lookup);

        let n_backup = std::env::var("SYNTH_N_BACKUP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.n_backup);

        let policy = std::env::var("SYNTH_POLICY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.policy);

        let idle_delay_ms = std::env::var("SYNTH_IDLE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.idle_delay_ms);

        Self {
            max_label_queue_len,
            max_model_queue_len,
            max_frame_queue_len,
            n_lookup,
            n_backup,
            policy,
            idle_delay_ms,
        }
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            SynthError::ConfigLoad(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| SynthError::ConfigLoad(format!("pipeline config is not valid JSON: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_label_queue_len == 0 || self.max_frame_queue_len == 0 {
            return Err(SynthError::InvalidConfig(
                "label and frame queues need a capacity of at least 1".to_string(),
            ));
        }
        let window = match self.policy {
            WindowPolicy::Simple => self.n_lookup,
            WindowPolicy::TwoTierBackup => self.n_lookup + self.n_backup,
        };
        if self.max_model_queue_len <= window {
            return Err(SynthError::InvalidConfig(format!(
                "max_model_queue_len ({}) must exceed the window size ({window})",
                self.max_model_queue_len
            )));
        }
        if self.policy == WindowPolicy::TwoTierBackup && self.n_backup == 0 {
            return Err(SynthError::InvalidConfig(
                "two-tier-backup policy needs n_backup >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}
