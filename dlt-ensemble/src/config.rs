//! Layered configuration: compiled defaults, then `dlt.toml`, then `DLT_*`
//! environment variables (`DLT_UPDATER__ALPHA=0.5`).

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::scorers::{canonical_name, SCORER_NAMES};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

fn default_db_url() -> String {
    "data/dlt.db".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { url: default_db_url() }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: default_db_url() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
    /// 0 means the whole history.
    #[serde(default)]
    pub window: usize,
    #[serde(default = "default_hot_window")]
    pub hot_window: usize,
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_enabled() -> Vec<String> {
    SCORER_NAMES.iter().map(|s| s.to_string()).collect()
}

fn default_hot_window() -> usize {
    30
}

fn default_min_history() -> usize {
    20
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_seed() -> u64 {
    42
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            window: 0,
            hot_window: default_hot_window(),
            min_history: default_min_history(),
            timeout_secs: default_timeout_secs(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Number of evaluated periods feeding the updater (N).
    #[serde(default = "default_updater_window")]
    pub window: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_updater_window() -> usize {
    5
}

fn default_alpha() -> f64 {
    0.6
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            window: default_updater_window(),
            alpha: default_alpha(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    12
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { top_k: default_top_k() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scorers: ScorerConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(config::File::with_name("dlt").required(false))
    }

    fn load_with<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).map_err(config_error)?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("DLT")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scorers.enabled")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        let mut config: AppConfig = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and canonicalises scorer names in place.
    pub fn validate(&mut self) -> Result<()> {
        if !(self.updater.alpha > 0.0 && self.updater.alpha <= 1.0) {
            return Err(PipelineError::Configuration(format!(
                "updater.alpha must be in (0, 1], got {}",
                self.updater.alpha
            )));
        }
        if self.updater.window == 0 {
            return Err(PipelineError::Configuration("updater.window must be at least 1".into()));
        }
        if self.scorers.min_history == 0 {
            return Err(PipelineError::Configuration("scorers.min_history must be at least 1".into()));
        }
        if self.scorers.hot_window == 0 {
            return Err(PipelineError::Configuration("scorers.hot_window must be at least 1".into()));
        }
        if self.recommend.top_k == 0 {
            return Err(PipelineError::Configuration("recommend.top_k must be at least 1".into()));
        }

        let mut enabled: Vec<String> = Vec::with_capacity(self.scorers.enabled.len());
        for name in &self.scorers.enabled {
            let canonical = canonical_name(name.trim())
                .ok_or_else(|| PipelineError::Configuration(format!("unknown scorer '{}'", name)))?;
            if !enabled.iter().any(|e| e == canonical) {
                enabled.push(canonical.to_string());
            }
        }
        if enabled.is_empty() {
            return Err(PipelineError::Configuration("no scorer enabled".into()));
        }
        self.scorers.enabled = enabled;
        Ok(())
    }
}

fn config_error(e: config::ConfigError) -> PipelineError {
    PipelineError::Configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<AppConfig> {
        AppConfig::load_with(config::File::from_str(toml, config::FileFormat::Toml))
    }

    #[test]
    fn test_defaults_are_valid() {
        let mut config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scorers.enabled.len(), 6);
        assert_eq!(config.updater.window, 5);
        assert!((config.updater.alpha - 0.6).abs() < 1e-12);
        assert_eq!(config.recommend.top_k, 12);
        assert_eq!(config.scorers.min_history, 20);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let config = from_toml(
            r#"
            [updater]
            alpha = 0.3
            window = 8

            [scorers]
            enabled = ["frequency", "Markov"]
            "#,
        )
        .unwrap();
        assert!((config.updater.alpha - 0.3).abs() < 1e-12);
        assert_eq!(config.updater.window, 8);
        assert_eq!(config.scorers.enabled, vec!["Frequency".to_string(), "Markov".to_string()]);
        assert_eq!(config.scorers.hot_window, 30);
    }

    #[test]
    fn test_unknown_scorer_rejected() {
        let err = from_toml("[scorers]\nenabled = [\"Oracle\"]\n").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.updater.alpha = 0.0;
        assert!(config.validate().is_err());
        config.updater.alpha = 1.5;
        assert!(config.validate().is_err());
        config.updater.alpha = 1.0;
        assert!(config.validate().is_ok());
    }
}
