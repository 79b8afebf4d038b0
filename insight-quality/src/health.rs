//! Quality tracked over time: sliding-window health trends and
//! period-over-period comparisons.

use crate::{assess_quality, IssueKind, QualityOptions, QualityReport};
use chrono::{DateTime, Utc};
use insight_core::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Window-to-window score moves inside this band count as stable.
const TREND_DEADBAND: f64 = 0.05;
/// A single-step score move past this is reported as a step change.
const STEP_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTrend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowQuality {
    pub start_index: usize,
    pub end_index: usize,
    pub score: f64,
    pub grade: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepChange {
    /// Index into `windows` where the jump landed.
    pub window_index: usize,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub windows: Vec<WindowQuality>,
    pub trend: HealthTrend,
    pub step_changes: Vec<StepChange>,
    pub latest_score: f64,
    pub mean_score: f64,
}

/// Scores overlapping windows across the series in input order and classifies
/// the overall quality trajectory. Windows advance by `step` samples.
pub fn monitor_stream_health(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    window_size: usize,
    step: usize,
    options: &QualityOptions,
) -> Result<HealthReport> {
    if window_size < 2 {
        return Err(InsightError::InvalidParameter(format!(
            "window_size must be at least 2, got {window_size}"
        )));
    }
    if step == 0 {
        return Err(InsightError::InvalidParameter(
            "step must be positive".to_string(),
        ));
    }
    if values.len() != timestamps.len() {
        return Err(InsightError::InvalidParameter(format!(
            "values and timestamps differ in length: {} vs {}",
            values.len(),
            timestamps.len()
        )));
    }

    let mut windows = Vec::new();
    let mut start = 0;
    while start + window_size <= values.len() {
        let end = start + window_size;
        let report = assess_quality(&values[start..end], &timestamps[start..end], options);
        windows.push(WindowQuality {
            start_index: start,
            end_index: end - 1,
            score: report.overall_score,
            grade: report.grade,
        });
        start += step;
    }

    if windows.is_empty() {
        return Ok(HealthReport {
            windows,
            trend: HealthTrend::Stable,
            step_changes: Vec::new(),
            latest_score: 0.0,
            mean_score: 0.0,
        });
    }

    let scores: Vec<f64> = windows.iter().map(|w| w.score).collect();
    let trend = classify_trend(&scores);
    let step_changes = scores
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| (pair[1] - pair[0]).abs() > STEP_THRESHOLD)
        .map(|(i, pair)| StepChange {
            window_index: i + 1,
            delta: pair[1] - pair[0],
        })
        .collect();

    let latest_score = scores[scores.len() - 1];
    let mean_score = scores.iter().sum::<f64>() / scores.len() as f64;

    debug!(
        windows = windows.len(),
        ?trend,
        latest_score,
        "stream health evaluated"
    );

    Ok(HealthReport {
        windows,
        trend,
        step_changes,
        latest_score,
        mean_score,
    })
}

/// Mean of the last three window scores against the first three, with a
/// deadband so sampling noise reads as stable.
fn classify_trend(scores: &[f64]) -> HealthTrend {
    if scores.len() < 2 {
        return HealthTrend::Stable;
    }
    let head = scores.len().min(3);
    let first: f64 = scores[..head].iter().sum::<f64>() / head as f64;
    let last: f64 = scores[scores.len() - head..].iter().sum::<f64>() / head as f64;
    let diff = last - first;
    if diff > TREND_DEADBAND {
        HealthTrend::Improving
    } else if diff < -TREND_DEADBAND {
        HealthTrend::Degrading
    } else {
        HealthTrend::Stable
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionDeltas {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityComparison {
    pub current: QualityReport,
    pub baseline: QualityReport,
    /// Current minus baseline overall score.
    pub score_delta: f64,
    pub dimension_deltas: DimensionDeltas,
    /// Issue kinds present now but not in the baseline.
    pub new_issues: Vec<IssueKind>,
    /// Issue kinds present in the baseline but resolved now.
    pub resolved_issues: Vec<IssueKind>,
}

/// Assesses both periods with the same options and diffs scores and issue
/// kinds.
pub fn compare_quality_periods(
    current_values: &[f64],
    current_timestamps: &[DateTime<Utc>],
    baseline_values: &[f64],
    baseline_timestamps: &[DateTime<Utc>],
    options: &QualityOptions,
) -> QualityComparison {
    let current = assess_quality(current_values, current_timestamps, options);
    let baseline = assess_quality(baseline_values, baseline_timestamps, options);

    let current_kinds: HashSet<IssueKind> = current.issues.iter().map(|i| i.kind).collect();
    let baseline_kinds: HashSet<IssueKind> = baseline.issues.iter().map(|i| i.kind).collect();

    let mut new_issues: Vec<IssueKind> =
        current_kinds.difference(&baseline_kinds).copied().collect();
    let mut resolved_issues: Vec<IssueKind> =
        baseline_kinds.difference(&current_kinds).copied().collect();
    new_issues.sort_by_key(|k| format!("{k:?}"));
    resolved_issues.sort_by_key(|k| format!("{k:?}"));

    QualityComparison {
        score_delta: current.overall_score - baseline.overall_score,
        dimension_deltas: DimensionDeltas {
            completeness: current.assessment.completeness - baseline.assessment.completeness,
            accuracy: current.assessment.accuracy - baseline.assessment.accuracy,
            consistency: current.assessment.consistency - baseline.assessment.consistency,
            timeliness: current.assessment.timeliness - baseline.assessment.timeliness,
        },
        new_issues,
        resolved_issues,
        current,
        baseline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn minutely(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc::now();
        (0..n).map(|i| start + Duration::seconds(60 * i as i64)).collect()
    }

    #[test]
    fn test_stable_health_on_clean_data() {
        let values: Vec<f64> = (0..120).map(|i| 20.0 + ((i % 3) as f64) * 0.2).collect();
        let report =
            monitor_stream_health(&values, &minutely(120), 30, 15, &QualityOptions::default())
                .unwrap();
        assert_eq!(report.trend, HealthTrend::Stable);
        assert!(report.step_changes.is_empty());
        assert!(report.latest_score > 0.9);
    }

    #[test]
    fn test_degrading_health_when_nans_appear() {
        let mut values: Vec<f64> = (0..120).map(|i| 20.0 + ((i % 3) as f64) * 0.2).collect();
        // Late data goes mostly missing.
        for v in values.iter_mut().skip(80) {
            *v = f64::NAN;
        }
        let report =
            monitor_stream_health(&values, &minutely(120), 30, 15, &QualityOptions::default())
                .unwrap();
        assert_eq!(report.trend, HealthTrend::Degrading);
        assert!(!report.step_changes.is_empty());
        assert!(report.latest_score < report.windows[0].score);
    }

    #[test]
    fn test_health_rejects_bad_window() {
        let err = monitor_stream_health(&[1.0; 10], &minutely(10), 1, 1, &QualityOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_health_empty_when_series_shorter_than_window() {
        let report =
            monitor_stream_health(&[1.0; 5], &minutely(5), 30, 15, &QualityOptions::default())
                .unwrap();
        assert!(report.windows.is_empty());
        assert_eq!(report.trend, HealthTrend::Stable);
    }

    #[test]
    fn test_comparison_flags_new_and_resolved_issues() {
        let clean: Vec<f64> = (0..60).map(|i| 21.0 + ((i % 4) as f64) * 0.1).collect();
        let mut dirty = clean.clone();
        for v in dirty.iter_mut().take(20) {
            *v = f64::NAN;
        }
        let ts = minutely(60);

        let comparison =
            compare_quality_periods(&dirty, &ts, &clean, &ts, &QualityOptions::default());
        assert!(comparison.score_delta < 0.0);
        assert!(comparison.new_issues.contains(&IssueKind::MissingData));
        assert!(comparison.resolved_issues.is_empty());

        let reverse = compare_quality_periods(&clean, &ts, &dirty, &ts, &QualityOptions::default());
        assert!(reverse.score_delta > 0.0);
        assert!(reverse.resolved_issues.contains(&IssueKind::MissingData));
    }

    #[test]
    fn test_comparison_dimension_deltas_match_reports() {
        let a: Vec<f64> = (0..50).map(|i| 10.0 + (i as f64 * 0.5).sin()).collect();
        let b: Vec<f64> = (0..50).map(|i| 10.0 + (i as f64 * 0.3).cos()).collect();
        let ts = minutely(50);
        let cmp = compare_quality_periods(&a, &ts, &b, &ts, &QualityOptions::default());
        let expected = cmp.current.assessment.accuracy - cmp.baseline.assessment.accuracy;
        assert!((cmp.dimension_deltas.accuracy - expected).abs() < 1e-12);
    }
}
