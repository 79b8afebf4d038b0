use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub url: String,
    pub max_connections: u32,
    pub fetch_limit: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            fetch_limit: 5000,
        }
    }
}

/// Documented defaults for every tunable analysis parameter. Callers needing
/// different behavior override by parameter, never by forking a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub z_score_threshold: f64,
    pub modified_z_threshold: f64,
    pub iqr_multiplier: f64,
    pub lof_neighbors: usize,
    pub lof_threshold: f64,
    pub consensus_threshold: f64,
    pub change_point_threshold: f64,
    pub sync_event_threshold: f64,
    pub default_fetch_count: usize,
    pub entropy_bins: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            z_score_threshold: 3.0,
            modified_z_threshold: 3.5,
            iqr_multiplier: 1.5,
            lof_neighbors: 5,
            lof_threshold: 1.5,
            consensus_threshold: 0.6,
            change_point_threshold: 4.0,
            sync_event_threshold: 2.0,
            default_fetch_count: 200,
            entropy_bins: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_analysis_settings() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.z_score_threshold, 3.0);
        assert_eq!(settings.consensus_threshold, 0.6);
        assert_eq!(settings.lof_neighbors, 5);
    }
}
