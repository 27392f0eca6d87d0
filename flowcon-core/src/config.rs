use crate::error::{CoreError, Result};
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to drive one experimental trial end to end.
///
/// The CLI builds this from parsed arguments; it can also be loaded from a
/// TOML/YAML/JSON file for embedding FlowCon outside of its own CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    pub experiment_name: String,
    pub interval_secs: u64,
    pub alpha: f64,
    pub docker_stats_interval_secs: u64,
    pub listener_interval_secs: u64,
    pub no_algo: bool,
    pub no_update: bool,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            experiment_name: "flowcon_trial".to_string(),
            interval_secs: 30,
            alpha: 0.03,
            docker_stats_interval_secs: 30,
            listener_interval_secs: 10,
            no_algo: false,
            no_update: false,
            log_level: LogLevel::Info,
            log_file: Some(PathBuf::from("FlowCon.log")),
        }
    }
}

impl TrialConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(CoreError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => {
                return Err(CoreError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(CoreError::Config(
                "interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.docker_stats_interval_secs == 0 {
            return Err(CoreError::Config(
                "docker_stats_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.alpha <= 0.0 {
            return Err(CoreError::Config("alpha must be positive".to_string()));
        }
        Ok(())
    }
}
