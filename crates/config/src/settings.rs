// SPDX-License-Identifier: Apache-2.0

//! Runtime settings for the workload manager.
//!
//! Every field has a working default; a JSON file can override any subset
//! of them.

use crate::{BoardClass, error::Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scheduling policy driving the queue manager's selection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// First-in first-out over the executable subset.
    #[default]
    Fifo,
    /// Shortest job first, ranked by oracle time predictions.
    Sjf,
    /// Least interaction first, ranked by relative slowdown predictions.
    Lif,
    /// Crow-search batch scheduling advised by the oracle.
    Csa,
}

/// Monitor cadence and training-phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Telemetry window period in milliseconds.
    pub period_ms: u64,
    /// Number of windows between two training phases.
    pub measurements_per_training: u32,
    /// Empirical observations-per-window factor used to convert the oracle's
    /// advised idle observation count into wall-clock time.
    pub idle_obs_per_window: f32,
    /// Capacity of the power-sample buffer, in samples.
    pub power_samples: usize,
    /// Capacity of the trace-event buffer, in samples.
    pub traces_samples: usize,
    /// CPU usage sampling period in milliseconds.
    pub cpu_usage_period_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            period_ms: 500,
            measurements_per_training: 200,
            idle_obs_per_window: 1.72,
            power_samples: 65536,
            traces_samples: 16384,
            cpu_usage_period_ms: 150,
        }
    }
}

/// Oracle endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Whether the external learner is attached at all.
    pub enabled: bool,
    /// Filesystem path of the training-channel stream socket.
    pub training_socket: PathBuf,
    /// Filesystem path of the prediction-channel stream socket.
    pub prediction_socket: PathBuf,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            training_socket: PathBuf::from("/tmp/awm_training_socket"),
            prediction_socket: PathBuf::from("/tmp/awm_prediction_socket"),
        }
    }
}

/// Selection of downstream observation/trace sinks.
///
/// One, two or all three may be enabled; the monitor is indifferent to which.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Stream windows into RAM-backed shared-memory segments.
    pub ram: bool,
    /// Write windows to regular files under `output_dir`.
    pub file: bool,
    /// Stream windows over a TCP connection.
    pub socket: bool,
    /// Directory for file-mode outputs and the historical dump.
    pub output_dir: PathBuf,
    /// Remote endpoint for socket mode, `host:port`.
    pub socket_addr: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            ram: true,
            file: false,
            socket: false,
            output_dir: PathBuf::from("outputs"),
            socket_addr: String::from("127.0.0.1:4242"),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Board class hosting the slot fabric.
    pub board: BoardClass,
    /// Number of reconfigurable slots. Zero means the board default.
    pub slots: usize,
    /// Scheduling policy.
    pub policy: PolicyKind,
    /// Queue depth inspected by the model-assisted policies.
    pub policy_scan_depth: usize,
    /// Directory holding the workload plan file triples.
    pub workload_dir: PathBuf,
    /// Compute-unit counts the arrival generator may draw for a task.
    pub cu_choices: Vec<u32>,
    /// Seed for the compute-unit draw.
    pub cu_seed: u64,
    /// Dispatch progress is logged every this many tasks.
    pub progress_stride: u64,
    /// Monitor settings.
    pub monitor: MonitorSettings,
    /// Oracle endpoints.
    pub oracle: OracleSettings,
    /// Observation/trace sinks.
    pub sinks: SinkSettings,
}

impl Default for SetupConfig {
    fn default() -> Self {
        let board = BoardClass::default();
        Self {
            board,
            slots: board.default_slots(),
            policy: PolicyKind::default(),
            policy_scan_depth: 4,
            workload_dir: PathBuf::from("synthetic_workload"),
            cu_choices: vec![1, 2, 4],
            cu_seed: 42,
            progress_stride: 400,
            monitor: MonitorSettings::default(),
            oracle: OracleSettings::default(),
            sinks: SinkSettings::default(),
        }
    }
}

impl SetupConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&raw).map_err(|source| Error::InvalidConfig {
                path: path.to_path_buf(),
                source,
            })?;
        if config.slots == 0 {
            config.slots = config.board.default_slots();
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency of the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.slots == 0 || self.slots > 32 {
            return Err(Error::InvalidSetting {
                setting: "slots",
                reason: format!("{} is outside [1, 32]", self.slots),
            });
        }
        if self.monitor.measurements_per_training == 0 {
            return Err(Error::InvalidSetting {
                setting: "monitor.measurements_per_training",
                reason: "must be at least 1".into(),
            });
        }
        if self.monitor.period_ms == 0 {
            return Err(Error::InvalidSetting {
                setting: "monitor.period_ms",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.monitor.idle_obs_per_window > 0.0) {
            return Err(Error::InvalidSetting {
                setting: "monitor.idle_obs_per_window",
                reason: "must be positive".into(),
            });
        }
        if self.cu_choices.is_empty() {
            return Err(Error::InvalidSetting {
                setting: "cu_choices",
                reason: "at least one compute-unit count is required".into(),
            });
        }
        if let Some(cu) = self
            .cu_choices
            .iter()
            .find(|&&cu| cu == 0 || cu as usize > self.slots)
        {
            return Err(Error::InvalidSetting {
                setting: "cu_choices",
                reason: format!("{cu} is outside [1, {}]", self.slots),
            });
        }
        if self.policy_scan_depth == 0 {
            return Err(Error::InvalidSetting {
                setting: "policy_scan_depth",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_validate() {
        SetupConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn rejects_oversized_cu_choice() {
        let config = SetupConfig {
            cu_choices: vec![1, 8],
            slots: 4,
            ..SetupConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"policy": "csa", "slots": 8, "board": "zcu"}}"#).expect("write");
        let config = SetupConfig::from_json_file(file.path()).expect("load");
        assert_eq!(config.policy, PolicyKind::Csa);
        assert_eq!(config.slots, 8);
        // Untouched fields keep their defaults.
        assert_eq!(config.monitor.period_ms, 500);
    }

    #[test]
    fn zero_slots_resolves_to_the_board_default() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"board": "zcu", "slots": 0, "cu_choices": [1, 2, 4, 8]}}"#)
            .expect("write");
        let config = SetupConfig::from_json_file(file.path()).expect("load");
        assert_eq!(config.slots, 8);
    }

    #[test]
    fn rejects_zero_training_interval() {
        let config = SetupConfig {
            monitor: MonitorSettings {
                measurements_per_training: 0,
                ..MonitorSettings::default()
            },
            ..SetupConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
