//! The individual outlier detectors. All are pure functions over a value
//! slice; none allocates beyond its return value.

use crate::{confidence_for, Anomaly, DetectionMethod, Severity, MIN_SAMPLES};
use insight_core::stats;
use insight_core::{InsightError, Result};
use serde::{Deserialize, Serialize};

/// Severity tiers shared by the deviation-style detectors (z-score units).
fn severity_from_sigma(score: f64) -> Severity {
    if score >= 4.0 {
        Severity::Critical
    } else if score >= 3.5 {
        Severity::High
    } else if score >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Tiers for scores expressed as a ratio of the detector's own threshold
/// (IQR distance, LOF density ratio).
fn severity_from_ratio(ratio: f64) -> Severity {
    if ratio >= 2.0 {
        Severity::Critical
    } else if ratio >= 1.5 {
        Severity::High
    } else if ratio >= 1.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Classic z-score detector. Default threshold 3.0.
pub fn z_score_anomalies(values: &[f64], threshold: f64) -> Vec<Anomaly> {
    if values.len() < MIN_SAMPLES {
        return Vec::new();
    }
    let z = stats::z_scores(values);
    z.iter()
        .enumerate()
        .filter(|(_, &zi)| zi.abs() > threshold)
        .map(|(i, &zi)| Anomaly {
            index: i,
            value: values[i],
            score: zi.abs(),
            method: DetectionMethod::ZScore,
            severity: severity_from_sigma(zi.abs()),
            confidence: confidence_for(zi.abs(), threshold),
        })
        .collect()
}

/// Robust variant using the median and MAD (scaled by 1.4826). Default
/// threshold 3.5. A zero MAD means no spread to measure against, so no
/// anomalies are reported.
pub fn modified_z_score_anomalies(values: &[f64], threshold: f64) -> Vec<Anomaly> {
    if values.len() < MIN_SAMPLES {
        return Vec::new();
    }
    let med = stats::median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let mad = stats::median(&deviations);
    if mad == 0.0 {
        return Vec::new();
    }
    let scale = mad * 1.4826;
    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let score = ((v - med) / scale).abs();
            if score > threshold {
                Some(Anomaly {
                    index: i,
                    value: v,
                    score,
                    method: DetectionMethod::ModifiedZScore,
                    severity: severity_from_sigma(score),
                    confidence: confidence_for(score, threshold),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Points outside `[Q1 - k*IQR, Q3 + k*IQR]`. The score is the distance past
/// the nearer fence, normalized by the IQR.
pub fn iqr_anomalies(values: &[f64], multiplier: f64) -> Vec<Anomaly> {
    if values.len() < MIN_SAMPLES {
        return Vec::new();
    }
    let q1 = stats::quantile(values, 0.25).unwrap_or(0.0);
    let q3 = stats::quantile(values, 0.75).unwrap_or(0.0);
    let iqr = q3 - q1;
    if iqr == 0.0 {
        return Vec::new();
    }
    let lower = q1 - multiplier * iqr;
    let upper = q3 + multiplier * iqr;

    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let distance = if v < lower {
                lower - v
            } else if v > upper {
                v - upper
            } else {
                return None;
            };
            let score = distance / iqr;
            Some(Anomaly {
                index: i,
                value: v,
                score,
                method: DetectionMethod::Iqr,
                severity: severity_from_ratio(score / multiplier + 1.0),
                confidence: confidence_for(score + multiplier, multiplier),
            })
        })
        .collect()
}

/// Naive one-dimensional Local Outlier Factor: the ratio of each point's
/// k-distance density to the average density of its neighbors. O(n^2), which
/// is acceptable for the expected batch sizes of a few hundred points.
pub fn lof_anomalies(values: &[f64], k: usize, threshold: f64) -> Vec<Anomaly> {
    let n = values.len();
    if n < MIN_SAMPLES || k == 0 {
        return Vec::new();
    }
    let k = k.min(n - 1);

    // k-distance per point from the sorted pairwise distances.
    let k_distance: Vec<f64> = (0..n)
        .map(|i| {
            let mut distances: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (values[i] - values[j]).abs())
                .collect();
            distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            distances[k - 1]
        })
        .collect();

    // Duplicate-heavy sensor data makes zero k-distances common; clamp so
    // densities stay finite and tied points compare as equally dense.
    let density = |i: usize| -> f64 { 1.0 / k_distance[i].max(f64::EPSILON) };

    let mut anomalies = Vec::new();
    for i in 0..n {
        let mut neighbors: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        neighbors.sort_by(|&a, &b| {
            (values[i] - values[a])
                .abs()
                .partial_cmp(&(values[i] - values[b]).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);

        let own_density = density(i);
        let neighbor_density: f64 =
            neighbors.iter().map(|&j| density(j)).sum::<f64>() / k as f64;

        let lof = neighbor_density / own_density;
        if lof > threshold {
            anomalies.push(Anomaly {
                index: i,
                value: values[i],
                score: lof,
                method: DetectionMethod::Lof,
                severity: severity_from_ratio(lof / threshold),
                confidence: confidence_for(lof, threshold),
            });
        }
    }
    anomalies
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalAnomalyReport {
    pub anomalies: Vec<Anomaly>,
    /// Expected value per anomaly, parallel to `anomalies`.
    pub expected: Vec<f64>,
    /// Per-phase mean over the declared period, as context for the caller.
    pub pattern: Vec<f64>,
    pub period: usize,
}

/// Per-phase mean/std over a declared period; deviations above `threshold`
/// standard deviations from the phase mean are flagged.
pub fn seasonal_anomalies(
    values: &[f64],
    period: usize,
    threshold: f64,
) -> Result<SeasonalAnomalyReport> {
    if period == 0 {
        return Err(InsightError::InvalidParameter(
            "seasonal period must be positive".into(),
        ));
    }
    let n = values.len();
    if n < 2 * period {
        return Ok(SeasonalAnomalyReport {
            anomalies: Vec::new(),
            expected: Vec::new(),
            pattern: Vec::new(),
            period,
        });
    }

    let mut phase_values: Vec<Vec<f64>> = vec![Vec::new(); period];
    for (i, &v) in values.iter().enumerate() {
        phase_values[i % period].push(v);
    }
    let pattern: Vec<f64> = phase_values.iter().map(|p| stats::mean(p)).collect();
    let phase_std: Vec<f64> = phase_values.iter().map(|p| stats::std_dev(p)).collect();

    let mut anomalies = Vec::new();
    let mut expected = Vec::new();
    for (i, &v) in values.iter().enumerate() {
        let phase = i % period;
        if phase_std[phase] == 0.0 {
            continue;
        }
        let score = ((v - pattern[phase]) / phase_std[phase]).abs();
        if score > threshold {
            anomalies.push(Anomaly {
                index: i,
                value: v,
                score,
                method: DetectionMethod::Seasonal,
                severity: severity_from_sigma(score),
                confidence: confidence_for(score, threshold),
            });
            expected.push(pattern[phase]);
        }
    }

    Ok(SeasonalAnomalyReport {
        anomalies,
        expected,
        pattern,
        period,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnomaly {
    pub index: usize,
    pub value: f64,
    pub predicted: f64,
    pub score: f64,
    pub severity: Severity,
    pub confidence: f64,
}

/// Rolling-window linear trend predicts each next point; deviation of the
/// actual value from the prediction, normalized by the window's residual
/// std, above `threshold` flags an anomaly.
pub fn trend_deviation_anomalies(
    values: &[f64],
    window: usize,
    threshold: f64,
) -> Result<Vec<TrendAnomaly>> {
    if window < 3 {
        return Err(InsightError::InvalidParameter(
            "trend window must be at least 3".into(),
        ));
    }
    let n = values.len();
    if n <= window {
        return Ok(Vec::new());
    }

    let mut anomalies = Vec::new();
    for i in window..n {
        let slice = &values[i - window..i];
        let trend = insight_analysis::timeseries::linear_trend(slice);
        let predicted = trend.intercept + trend.slope * window as f64;

        let residual_std = {
            let residuals: Vec<f64> = slice
                .iter()
                .enumerate()
                .map(|(t, &v)| v - (trend.intercept + trend.slope * t as f64))
                .collect();
            stats::std_dev(&residuals)
        };
        if residual_std == 0.0 {
            continue;
        }

        let score = ((values[i] - predicted) / residual_std).abs();
        if score > threshold {
            anomalies.push(TrendAnomaly {
                index: i,
                value: values[i],
                predicted,
                score,
                severity: severity_from_sigma(score),
                confidence: confidence_for(score, threshold),
            });
        }
    }
    Ok(anomalies)
}

/// Rolling-window z detector whose effective threshold scales with recent
/// volatility: `sensitivity * (1 + std/|mean|)`. Loosens during volatile
/// regimes, tightens during calm ones.
pub fn adaptive_threshold_anomalies(
    values: &[f64],
    window: usize,
    sensitivity: f64,
) -> Result<Vec<Anomaly>> {
    if window < 2 {
        return Err(InsightError::InvalidParameter(
            "adaptive window must be at least 2".into(),
        ));
    }
    let n = values.len();
    if n <= window {
        return Ok(Vec::new());
    }

    let mut anomalies = Vec::new();
    for i in window..n {
        let slice = &values[i - window..i];
        let mean = stats::mean(slice);
        let std = stats::std_dev(slice);
        if std == 0.0 {
            continue;
        }
        let volatility = if mean.abs() > f64::EPSILON {
            std / mean.abs()
        } else {
            0.0
        };
        let threshold = sensitivity * (1.0 + volatility);
        let z = ((values[i] - mean) / std).abs();
        if z > threshold {
            anomalies.push(Anomaly {
                index: i,
                value: values[i],
                score: z,
                method: DetectionMethod::Adaptive,
                severity: severity_from_sigma(z),
                confidence: confidence_for(z, threshold),
            });
        }
    }
    Ok(anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_outlier() -> Vec<f64> {
        // Twenty points near 22 plus one extreme reading.
        let mut values = vec![
            22.1, 21.9, 22.0, 22.3, 21.8, 22.2, 22.0, 21.7, 22.4, 22.1, 21.9, 22.0, 22.2, 21.8,
            22.1, 22.0, 22.3, 21.9, 22.0, 22.1,
        ];
        values.push(55.0);
        values
    }

    #[test]
    fn test_z_score_flags_extreme() {
        let values = with_outlier();
        let anomalies = z_score_anomalies(&values, 3.0);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 20);
        assert!(anomalies[0].score > 3.0);
        assert_eq!(anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn test_modified_z_score_flags_extreme() {
        let values = with_outlier();
        let anomalies = modified_z_score_anomalies(&values, 3.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 20);
    }

    #[test]
    fn test_iqr_flags_extreme() {
        let values = with_outlier();
        let anomalies = iqr_anomalies(&values, 1.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 20);
        assert!(anomalies[0].score > 0.0);
    }

    #[test]
    fn test_lof_flags_isolated_point() {
        let mut values: Vec<f64> = (0..30).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        values.push(100.0);
        let anomalies = lof_anomalies(&values, 5, 1.5);
        assert!(anomalies.iter().any(|a| a.index == 30));
    }

    #[test]
    fn test_short_series_yield_nothing() {
        let short = [1.0, 2.0];
        assert!(z_score_anomalies(&short, 3.0).is_empty());
        assert!(modified_z_score_anomalies(&short, 3.5).is_empty());
        assert!(iqr_anomalies(&short, 1.5).is_empty());
        assert!(lof_anomalies(&short, 5, 1.5).is_empty());
    }

    #[test]
    fn test_constant_series_yield_nothing() {
        let constant = [5.0; 30];
        assert!(z_score_anomalies(&constant, 3.0).is_empty());
        assert!(modified_z_score_anomalies(&constant, 3.5).is_empty());
        assert!(iqr_anomalies(&constant, 1.5).is_empty());
        assert!(lof_anomalies(&constant, 5, 1.5).is_empty());
        assert!(adaptive_threshold_anomalies(&constant, 10, 2.5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_seasonal_anomaly_on_broken_phase() {
        // Daily-like cycle of 6 phases, one corrupted occurrence.
        let mut values = Vec::new();
        for cycle in 0..8 {
            for phase in 0..6 {
                let base = [10.0, 12.0, 15.0, 15.0, 12.0, 10.0][phase];
                values.push(base + (cycle as f64 * 0.05));
            }
        }
        values[27] = 30.0; // cycle 4, phase 3
        let report = seasonal_anomalies(&values, 6, 2.0).unwrap();
        assert!(report.anomalies.iter().any(|a| a.index == 27));
        assert_eq!(report.pattern.len(), 6);
        assert_eq!(report.anomalies.len(), report.expected.len());
    }

    #[test]
    fn test_seasonal_short_series_degrades() {
        let report = seasonal_anomalies(&[1.0, 2.0, 3.0], 4, 2.0).unwrap();
        assert!(report.anomalies.is_empty());
        assert!(report.pattern.is_empty());
    }

    #[test]
    fn test_trend_deviation_detects_break() {
        // Clean ramp, then a sudden drop against the trend.
        let mut values: Vec<f64> = (0..30).map(|i| i as f64 + ((i % 3) as f64) * 0.01).collect();
        values.push(5.0);
        let anomalies = trend_deviation_anomalies(&values, 10, 2.5).unwrap();
        assert!(anomalies.iter().any(|a| a.index == 30));
        let hit = anomalies.iter().find(|a| a.index == 30).unwrap();
        assert!(hit.predicted > 25.0);
    }

    #[test]
    fn test_adaptive_threshold_flags_break_in_calm_regime() {
        // Calm window keeps the effective threshold near the sensitivity, so
        // a modest excursion is still flagged.
        let mut calm: Vec<f64> = (0..40).map(|i| 100.0 + ((i % 2) as f64) * 0.2).collect();
        calm.push(101.0);
        let flagged = adaptive_threshold_anomalies(&calm, 20, 2.0).unwrap();
        assert!(flagged.iter().any(|a| a.index == 40));
    }

    #[test]
    fn test_invalid_windows_rejected() {
        assert!(trend_deviation_anomalies(&[1.0; 10], 2, 2.5).is_err());
        assert!(adaptive_threshold_anomalies(&[1.0; 10], 1, 2.5).is_err());
    }
}
