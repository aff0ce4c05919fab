//! Application configuration.
//!
//! Runtime configuration is loaded from an optional TOML file and
//! environment variables; compile-time policy lives in `constants`. The
//! analysis itself takes no tunables — configuration selects the data
//! source and how results are rendered.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

fn default_output_format() -> String {
    "text".to_string()
}

fn default_max_irqs_per_cpu() -> usize {
    10
}

/// Application configuration loaded from multiple sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to a captured sosreport tree. `None` analyzes the live host.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,

    /// Report format: `text` or `json`.
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Show every violating IRQ and container instead of truncating.
    #[serde(default)]
    pub full_report: bool,

    /// Truncation limit for per-CPU IRQ listings in text reports.
    #[serde(default = "default_max_irqs_per_cpu")]
    pub max_irqs_per_cpu: usize,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            output_format: default_output_format(),
            full_report: false,
            max_irqs_per_cpu: default_max_irqs_per_cpu(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from defaults, `analyzer.toml`, and
    /// `IRQ_ANALYZER_`-prefixed environment variables, in rising priority.
    pub fn load() -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("analyzer.toml"))
            .merge(Env::prefixed("IRQ_ANALYZER_"))
            .extract()
            .map_err(|e| AnalysisError::Config(format!("failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.output_format.as_str(), "text" | "json") {
            return Err(AnalysisError::Config(format!(
                "output_format must be 'text' or 'json', got '{}'",
                self.output_format
            )));
        }
        if let Some(dir) = &self.snapshot_dir {
            if !dir.is_dir() {
                return Err(AnalysisError::Config(format!(
                    "snapshot_dir {} is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_format, "text");
        assert_eq!(config.max_irqs_per_cpu, 10);
    }

    #[test]
    fn bad_output_format_is_rejected() {
        let config = Config {
            output_format: "yaml".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_snapshot_dir_is_rejected() {
        let config = Config {
            snapshot_dir: Some(PathBuf::from("/definitely/not/here")),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn existing_snapshot_dir_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
