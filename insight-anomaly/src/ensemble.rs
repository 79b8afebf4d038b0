//! Consensus voting across the index-based detectors.

use crate::detectors::{
    iqr_anomalies, lof_anomalies, modified_z_score_anomalies, z_score_anomalies,
};
use crate::{Anomaly, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMethod {
    ZScore,
    ModifiedZScore,
    Iqr,
    Lof,
}

impl EnsembleMethod {
    fn name(&self) -> &'static str {
        match self {
            EnsembleMethod::ZScore => "z_score",
            EnsembleMethod::ModifiedZScore => "modified_z_score",
            EnsembleMethod::Iqr => "iqr",
            EnsembleMethod::Lof => "lof",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub methods: Vec<EnsembleMethod>,
    /// Fraction of selected methods that must flag an index.
    pub consensus_threshold: f64,
    pub z_score_threshold: f64,
    pub modified_z_threshold: f64,
    pub iqr_multiplier: f64,
    pub lof_neighbors: usize,
    pub lof_threshold: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            methods: vec![
                EnsembleMethod::ZScore,
                EnsembleMethod::ModifiedZScore,
                EnsembleMethod::Iqr,
                EnsembleMethod::Lof,
            ],
            consensus_threshold: 0.6,
            z_score_threshold: 3.0,
            modified_z_threshold: 3.5,
            iqr_multiplier: 1.5,
            lof_neighbors: 5,
            lof_threshold: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleAnomaly {
    pub index: usize,
    pub value: f64,
    /// Mean anomaly score across the methods that flagged this index.
    pub consensus_score: f64,
    /// Fraction of selected methods that flagged this index.
    pub consensus: f64,
    /// Individual scores, keyed by method name; only flagging methods appear.
    pub method_scores: BTreeMap<String, f64>,
    pub severity: Severity,
    pub confidence: f64,
}

/// Runs the selected detectors independently and reports only indices whose
/// flagging fraction meets the consensus threshold.
pub fn ensemble_detection(values: &[f64], config: &EnsembleConfig) -> Vec<EnsembleAnomaly> {
    if values.len() < 5 || config.methods.is_empty() {
        return Vec::new();
    }

    let mut votes: BTreeMap<usize, BTreeMap<String, f64>> = BTreeMap::new();
    for method in &config.methods {
        let anomalies: Vec<Anomaly> = match method {
            EnsembleMethod::ZScore => z_score_anomalies(values, config.z_score_threshold),
            EnsembleMethod::ModifiedZScore => {
                modified_z_score_anomalies(values, config.modified_z_threshold)
            }
            EnsembleMethod::Iqr => iqr_anomalies(values, config.iqr_multiplier),
            EnsembleMethod::Lof => {
                lof_anomalies(values, config.lof_neighbors, config.lof_threshold)
            }
        };
        for anomaly in anomalies {
            votes
                .entry(anomaly.index)
                .or_default()
                .insert(method.name().to_string(), anomaly.score);
        }
    }

    let method_count = config.methods.len() as f64;
    let mut results = Vec::new();
    for (index, method_scores) in votes {
        let consensus = method_scores.len() as f64 / method_count;
        if consensus < config.consensus_threshold {
            continue;
        }
        let consensus_score =
            method_scores.values().sum::<f64>() / method_scores.len() as f64;
        results.push(EnsembleAnomaly {
            index,
            value: values[index],
            consensus_score,
            consensus,
            severity: ensemble_severity(consensus_score, consensus),
            confidence: (consensus * (consensus_score / 6.0).min(1.0)).clamp(0.0, 1.0),
            method_scores,
        });
    }

    debug!(
        candidates = results.len(),
        methods = config.methods.len(),
        "ensemble detection complete"
    );
    results
}

/// Severity from score magnitude weighted by how unanimous the vote was.
fn ensemble_severity(consensus_score: f64, consensus: f64) -> Severity {
    let weighted = consensus_score * (0.5 + 0.5 * consensus);
    if weighted >= 4.0 {
        Severity::Critical
    } else if weighted >= 3.0 {
        Severity::High
    } else if weighted >= 2.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_outlier() -> Vec<f64> {
        let mut values: Vec<f64> = (0..20).map(|i| 22.0 + ((i % 7) as f64) * 0.1).collect();
        values.push(55.0);
        values
    }

    #[test]
    fn test_ensemble_flags_shared_outlier() {
        let values = with_outlier();
        let anomalies = ensemble_detection(&values, &EnsembleConfig::default());
        assert_eq!(anomalies.len(), 1);
        let hit = &anomalies[0];
        assert_eq!(hit.index, 20);
        assert!(hit.consensus >= 0.6);
        assert!(hit.method_scores.len() >= 3);
    }

    #[test]
    fn test_consensus_score_is_mean_of_flagging_methods() {
        let values = with_outlier();
        let anomalies = ensemble_detection(&values, &EnsembleConfig::default());
        let hit = &anomalies[0];
        let expected =
            hit.method_scores.values().sum::<f64>() / hit.method_scores.len() as f64;
        assert!((hit.consensus_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ensemble_never_invents_indices() {
        let values = with_outlier();
        let config = EnsembleConfig::default();
        let individual: std::collections::HashSet<usize> = [
            crate::z_score_anomalies(&values, config.z_score_threshold),
            crate::modified_z_score_anomalies(&values, config.modified_z_threshold),
            crate::iqr_anomalies(&values, config.iqr_multiplier),
            crate::lof_anomalies(&values, config.lof_neighbors, config.lof_threshold),
        ]
        .iter()
        .flatten()
        .map(|a| a.index)
        .collect();

        for anomaly in ensemble_detection(&values, &config) {
            assert!(individual.contains(&anomaly.index));
        }
    }

    #[test]
    fn test_ensemble_short_series_is_empty() {
        assert!(ensemble_detection(&[1.0, 2.0, 99.0, 2.0], &EnsembleConfig::default()).is_empty());
    }

    #[test]
    fn test_ensemble_subset_of_methods() {
        let values = with_outlier();
        let config = EnsembleConfig {
            methods: vec![EnsembleMethod::ZScore, EnsembleMethod::Iqr],
            consensus_threshold: 1.0,
            ..EnsembleConfig::default()
        };
        let anomalies = ensemble_detection(&values, &config);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].method_scores.len(), 2);
        assert_eq!(anomalies[0].consensus, 1.0);
    }

    #[test]
    fn test_constant_series_no_consensus() {
        assert!(ensemble_detection(&[7.0; 30], &EnsembleConfig::default()).is_empty());
    }
}
