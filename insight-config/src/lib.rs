//! Layered configuration loading: a YAML file overlaid by environment
//! variables under the `STREAM_INSIGHT` prefix, deserialized into
//! `EngineSettings`.

use config::{Config, Environment, File};
use insight_core::config::EngineSettings;
use insight_core::{InsightError, Result};
use std::path::Path;
use tracing::info;

const ENV_PREFIX: &str = "STREAM_INSIGHT";

#[derive(Debug)]
pub struct ConfigManager {
    config: Config,
    settings: EngineSettings,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::from_file("config.yaml")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| InsightError::Configuration(e.to_string()))?;

        let settings: EngineSettings = config
            .clone()
            .try_deserialize()
            .map_err(|e| InsightError::Configuration(e.to_string()))?;

        info!("configuration loaded");

        Ok(Self { config, settings })
    }

    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| InsightError::Configuration(e.to_string()))?;

        let settings: EngineSettings = config
            .clone()
            .try_deserialize()
            .unwrap_or_default();

        info!("configuration loaded from environment");

        Ok(Self { config, settings })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }

    pub fn reload(&mut self) -> Result<()> {
        self.settings = self
            .config
            .clone()
            .try_deserialize()
            .map_err(|e| InsightError::Configuration(e.to_string()))?;

        info!("configuration reloaded");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_settings(&self.settings)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.settings)
            .map_err(|e| InsightError::Configuration(e.to_string()))?;

        std::fs::write(path, yaml).map_err(|e| InsightError::Configuration(e.to_string()))?;

        info!("configuration saved to file");
        Ok(())
    }
}

/// Parameter-contract checks shared by every loading path.
pub fn validate_settings(settings: &EngineSettings) -> Result<()> {
    if settings.storage.url.is_empty() {
        return Err(InsightError::Configuration(
            "database URL not configured".to_string(),
        ));
    }
    if settings.storage.max_connections == 0 {
        return Err(InsightError::Configuration(
            "max_connections must be positive".to_string(),
        ));
    }
    if settings.storage.fetch_limit == 0 {
        return Err(InsightError::Configuration(
            "fetch_limit must be positive".to_string(),
        ));
    }

    let analysis = &settings.analysis;
    if analysis.z_score_threshold <= 0.0
        || analysis.modified_z_threshold <= 0.0
        || analysis.iqr_multiplier <= 0.0
        || analysis.change_point_threshold <= 0.0
        || analysis.sync_event_threshold <= 0.0
    {
        return Err(InsightError::Configuration(
            "detection thresholds must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&analysis.consensus_threshold) {
        return Err(InsightError::Configuration(
            "consensus_threshold must lie in [0, 1]".to_string(),
        ));
    }
    if analysis.lof_neighbors == 0 {
        return Err(InsightError::Configuration(
            "lof_neighbors must be positive".to_string(),
        ));
    }
    if analysis.default_fetch_count == 0 || analysis.entropy_bins == 0 {
        return Err(InsightError::Configuration(
            "fetch count and entropy bins must be positive".to_string(),
        ));
    }

    info!("configuration validation passed");
    Ok(())
}
