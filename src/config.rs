//! Layered settings: defaults, optional config file, environment overrides

use crate::model::TieBreak;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "SEGMENTFORGE";

pub const DEFAULT_MODEL_DIR: &str = "models_artifacts";
pub const DEFAULT_DATASET_PATH: &str = "data/processed/mall_customers_processed.csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Directory holding `scaler.json` and `kmeans_model.json`
    pub model_dir: PathBuf,
    /// CSV used for cluster statistics and as the default training input
    pub dataset_path: PathBuf,
    /// Optional JSON overrides for segment names and texts
    #[serde(default)]
    pub knowledge_base_path: Option<PathBuf>,
    /// Statistics skip datasets larger than this
    #[serde(default)]
    pub max_dataset_bytes: Option<u64>,
    #[serde(default)]
    pub tie_break: TieBreak,
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            knowledge_base_path: None,
            max_dataset_bytes: None,
            tie_break: TieBreak::LowestIndex,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Build settings; `SEGMENTFORGE__MODEL_DIR` style variables win over the file
    pub fn load(config_file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("model_dir", DEFAULT_MODEL_DIR)?
            .set_default("dataset_path", DEFAULT_DATASET_PATH)?
            .set_default("tie_break", "lowest_index")?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("Log level must not be empty"));
        }

        if self.max_dataset_bytes == Some(0) {
            return Err(anyhow!("Dataset size limit must be greater than 0"));
        }

        if self.model_dir.as_os_str().is_empty() {
            return Err(anyhow!("Model directory is required"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.model_dir, PathBuf::from("models_artifacts"));
        assert_eq!(settings.tie_break, TieBreak::LowestIndex);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "model_dir = \"/srv/segments/artifacts\"").unwrap();
        writeln!(file, "max_dataset_bytes = 1048576").unwrap();
        writeln!(file, "tie_break = \"highest_index\"").unwrap();
        writeln!(file, "log_format = \"json\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.model_dir, PathBuf::from("/srv/segments/artifacts"));
        assert_eq!(settings.dataset_path, PathBuf::from(DEFAULT_DATASET_PATH));
        assert_eq!(settings.max_dataset_bytes, Some(1_048_576));
        assert_eq!(settings.tie_break, TieBreak::HighestIndex);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.knowledge_base_path, None);
    }

    #[test]
    fn test_invalid_settings() {
        let mut settings = Settings {
            max_dataset_bytes: Some(0),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings.max_dataset_bytes = None;
        settings.log_level = " ".to_string();
        assert!(settings.validate().is_err());
    }
}
