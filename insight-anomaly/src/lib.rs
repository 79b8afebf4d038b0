//! Outlier detection over bounded series: five independent detectors, a
//! consensus ensemble, and an adaptive-threshold variant. Every detector
//! tolerates short or degenerate input by returning no anomalies rather than
//! erroring.

pub mod detectors;
pub mod ensemble;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    ModifiedZScore,
    Iqr,
    Lof,
    Seasonal,
    TrendDeviation,
    Ensemble,
    Adaptive,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DetectionMethod::ZScore => "z_score",
            DetectionMethod::ModifiedZScore => "modified_z_score",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::Lof => "lof",
            DetectionMethod::Seasonal => "seasonal",
            DetectionMethod::TrendDeviation => "trend_deviation",
            DetectionMethod::Ensemble => "ensemble",
            DetectionMethod::Adaptive => "adaptive",
        };
        write!(f, "{name}")
    }
}

/// A flagged sample. Indices reference positions in the evaluated series;
/// conversion to absolute time is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    pub value: f64,
    pub score: f64,
    pub method: DetectionMethod,
    pub severity: Severity,
    pub confidence: f64,
}

pub use detectors::{
    adaptive_threshold_anomalies, iqr_anomalies, lof_anomalies, modified_z_score_anomalies,
    seasonal_anomalies, trend_deviation_anomalies, z_score_anomalies, SeasonalAnomalyReport,
    TrendAnomaly,
};
pub use ensemble::{ensemble_detection, EnsembleAnomaly, EnsembleConfig, EnsembleMethod};

/// Minimum samples before any single detector produces output.
pub(crate) const MIN_SAMPLES: usize = 4;

/// Confidence grows with the margin past the detector's threshold, saturating
/// at twice the threshold.
pub(crate) fn confidence_for(score: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    (score / (threshold * 2.0)).clamp(0.0, 1.0)
}
