//! Configuration management for autotag.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section is `#[serde(default)]`, so a partial file is fine.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for autotag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Catalog source settings
    pub catalog: CatalogConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Embedding model settings
    pub embedding: EmbeddingConfig,

    /// Keyword ranking settings
    pub ranking: RankingConfig,

    /// Sidecar merge settings
    pub sidecar: SidecarConfig,

    /// Report output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/rs.autotag.autotag/config.toml
    /// - Linux: ~/.config/autotag/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\autotag\autotag\config\config.toml
    ///
    /// Falls back to ~/.autotag/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("rs", "autotag", "autotag")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".autotag").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Get the resolved vocabulary file path (with ~ expansion).
    pub fn keywords_file(&self) -> PathBuf {
        expand(&self.general.keywords_file)
    }

    /// Get the resolved embedding cache directory, if persistence is enabled.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.embedding.cache_dir.as_deref().map(expand)
    }

    /// Get the resolved report path, if a report is configured.
    pub fn report_path(&self) -> Option<PathBuf> {
        self.output.report_path.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ranking.threshold, 0.5);
        assert_eq!(config.ranking.max_keywords, 20);
        assert_eq!(config.ranking.max_image_dimension, 1024);
        assert!(!config.sidecar.overwrite);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[ranking]"));
        assert!(toml.contains("[sidecar]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ranking]\nthreshold = 0.25\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.ranking.threshold, 0.25);
        assert_eq!(config.ranking.max_keywords, 20);
        assert_eq!(config.embedding.model, "clip-vit-base-patch32");
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ranking]\nmax_keywords = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_keywords"));
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = Config::default();
        config.general.model_dir = PathBuf::from("/opt/models");
        assert_eq!(config.model_dir(), PathBuf::from("/opt/models"));

        config.general.model_dir = PathBuf::from("~/models");
        assert!(!config.model_dir().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_prompt_template() {
        let mut config = EmbeddingConfig::default();
        assert_eq!(config.prompt_for("lake"), "lake");
        config.prompt_template = "a photo of {term}".to_string();
        assert_eq!(config.prompt_for("lake"), "a photo of lake");
    }

    #[test]
    fn test_empty_string_disables_optional_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[embedding]\ncache_dir = \"\"\n\n[output]\nreport_path = \"\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.embedding.cache_dir, None);
        assert_eq!(config.cache_dir(), None);
        assert_eq!(config.output.report_path, None);
        assert_eq!(config.report_path(), None);
    }

    #[test]
    fn test_disabled_paths_survive_toml_round_trip() {
        let mut config = Config::default();
        config.embedding.cache_dir = None;
        config.output.report_path = None;

        let toml = config.to_toml().unwrap();
        assert!(toml.contains("report_path = \"\""));
        let reloaded: Config = toml::from_str(&toml).unwrap();
        assert_eq!(reloaded.embedding.cache_dir, None);
        assert_eq!(reloaded.output.report_path, None);

        let defaults: Config = toml::from_str(&Config::default().to_toml().unwrap()).unwrap();
        assert_eq!(
            defaults.output.report_path,
            Some(PathBuf::from("keyword_suggestions.json"))
        );
    }
}
