//! Data-quality scoring: four independent dimensions averaged into an
//! overall score and letter grade, plus the lightweight `DataQuality`
//! snapshot attached to every fetched stream.

pub mod health;

use chrono::{DateTime, Utc};
use insight_core::stats;
use insight_core::{DataQuality, TimeGap};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inter-sample intervals beyond this multiple of the expected interval
/// count as gaps.
const GAP_FACTOR: f64 = 2.5;

#[derive(Debug, Clone, Default)]
pub struct QualityOptions {
    /// Expected seconds between samples; inferred from the median interval
    /// when absent.
    pub expected_interval_secs: Option<f64>,
    /// Declared valid value range, when the sensor has one.
    pub expected_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingData,
    Outliers,
    OutOfRange,
    Drift,
    Noise,
    Gaps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub percent_affected: f64,
    pub description: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub grade: char,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<String>,
    pub assessment: DimensionScores,
    pub sample_size: usize,
}

pub fn grade_for(score: f64) -> char {
    if score >= 0.9 {
        'A'
    } else if score >= 0.8 {
        'B'
    } else if score >= 0.7 {
        'C'
    } else if score >= 0.6 {
        'D'
    } else {
        'F'
    }
}

/// Full four-dimension assessment of one slice of data. Computed on demand,
/// never cached; identical input yields an identical report.
pub fn assess_quality(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    options: &QualityOptions,
) -> QualityReport {
    let n = values.len();
    if n == 0 {
        return QualityReport {
            overall_score: 0.0,
            grade: 'F',
            issues: vec![QualityIssue {
                kind: IssueKind::MissingData,
                severity: IssueSeverity::High,
                percent_affected: 100.0,
                description: "no samples in the requested window".into(),
                suggestion: "verify the stream id and widen the query window".into(),
            }],
            recommendations: vec!["verify the stream id and widen the query window".into()],
            assessment: DimensionScores {
                completeness: 0.0,
                accuracy: 0.0,
                consistency: 0.0,
                timeliness: 0.0,
            },
            sample_size: 0,
        };
    }

    let mut issues = Vec::new();

    // Value-based dimensions only look at finite samples; NaN and infinities
    // are counted against completeness instead.
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

    let completeness = completeness_score(values, timestamps, options, &mut issues);
    let accuracy = accuracy_score(&finite, options, &mut issues);
    let consistency = consistency_score(&finite, &mut issues);
    let timeliness = timeliness_score(timestamps, options, &mut issues);

    let overall_score = (completeness + accuracy + consistency + timeliness) / 4.0;
    let recommendations: Vec<String> = issues.iter().map(|i| i.suggestion.clone()).collect();

    debug!(
        overall_score,
        completeness, accuracy, consistency, timeliness, "quality assessment complete"
    );

    QualityReport {
        overall_score,
        grade: grade_for(overall_score),
        issues,
        recommendations,
        assessment: DimensionScores {
            completeness,
            accuracy,
            consistency,
            timeliness,
        },
        sample_size: n,
    }
}

fn completeness_score(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    options: &QualityOptions,
    issues: &mut Vec<QualityIssue>,
) -> f64 {
    let n = values.len();
    let finite = values.iter().filter(|v| v.is_finite()).count();
    let score = match options.expected_interval_secs {
        Some(interval) if interval > 0.0 && timestamps.len() >= 2 => {
            let span = span_secs(timestamps);
            let expected = (span / interval).floor() + 1.0;
            if expected <= 0.0 {
                1.0
            } else {
                (finite as f64 / expected).min(1.0)
            }
        }
        _ => finite as f64 / n as f64,
    };

    if score < 0.8 {
        let missing_pct = (1.0 - score) * 100.0;
        issues.push(QualityIssue {
            kind: IssueKind::MissingData,
            severity: severity_for(score),
            percent_affected: missing_pct,
            description: format!("{missing_pct:.1}% of expected samples are missing"),
            suggestion: "check sensor connectivity and the ingestion pipeline".into(),
        });
    }
    score
}

fn accuracy_score(values: &[f64], options: &QualityOptions, issues: &mut Vec<QualityIssue>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let q1 = stats::quantile(values, 0.25).unwrap_or(0.0);
    let q3 = stats::quantile(values, 0.75).unwrap_or(0.0);
    let iqr = q3 - q1;
    let outliers = if iqr > 0.0 {
        let lower = q1 - 1.5 * iqr;
        let upper = q3 + 1.5 * iqr;
        values.iter().filter(|&&v| v < lower || v > upper).count()
    } else {
        0
    };

    let out_of_range = match options.expected_range {
        Some((min, max)) => values.iter().filter(|&&v| v < min || v > max).count(),
        None => 0,
    };

    if out_of_range > 0 {
        let pct = out_of_range as f64 / n as f64 * 100.0;
        issues.push(QualityIssue {
            kind: IssueKind::OutOfRange,
            severity: severity_for(1.0 - out_of_range as f64 / n as f64),
            percent_affected: pct,
            description: format!("{out_of_range} readings outside the declared range"),
            suggestion: "inspect sensor calibration or the declared range".into(),
        });
    }

    let score = (1.0 - (outliers + out_of_range) as f64 / n as f64).clamp(0.0, 1.0);
    if score < 0.8 && outliers > 0 {
        issues.push(QualityIssue {
            kind: IssueKind::Outliers,
            severity: severity_for(score),
            percent_affected: outliers as f64 / n as f64 * 100.0,
            description: format!("{outliers} statistical outliers detected"),
            suggestion: "review the flagged readings for sensor faults".into(),
        });
    }
    score
}

fn consistency_score(values: &[f64], issues: &mut Vec<QualityIssue>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let std = stats::std_dev(values);
    let mean = stats::mean(values);

    let drift = if n >= 4 && std > 0.0 {
        let mid = n / 2;
        let first = stats::mean(&values[..mid]);
        let second = stats::mean(&values[mid..]);
        ((second - first).abs() / std).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let noise = if mean.abs() > f64::EPSILON {
        (std / mean.abs()).clamp(0.0, 1.0)
    } else {
        0.0
    };

    if drift > 0.5 {
        issues.push(QualityIssue {
            kind: IssueKind::Drift,
            severity: severity_for(1.0 - drift),
            percent_affected: drift * 100.0,
            description: "sustained shift between first and second half means".into(),
            suggestion: "check for sensor drift or a setpoint change".into(),
        });
    }
    if noise > 0.5 {
        issues.push(QualityIssue {
            kind: IssueKind::Noise,
            severity: severity_for(1.0 - noise),
            percent_affected: noise * 100.0,
            description: "high variability relative to the signal level".into(),
            suggestion: "consider filtering or increasing the sampling window".into(),
        });
    }

    (1.0 - (drift + noise) / 2.0).clamp(0.0, 1.0)
}

fn timeliness_score(
    timestamps: &[DateTime<Utc>],
    options: &QualityOptions,
    issues: &mut Vec<QualityIssue>,
) -> f64 {
    if timestamps.len() < 2 {
        return 1.0;
    }
    let gaps = detect_gaps(timestamps, options.expected_interval_secs);
    let span = span_secs(timestamps);
    if span <= 0.0 {
        return 1.0;
    }
    let gap_total: f64 = gaps.iter().map(|g| g.duration_secs).sum();
    let score = (1.0 - gap_total / span).clamp(0.0, 1.0);

    if !gaps.is_empty() && score < 0.8 {
        issues.push(QualityIssue {
            kind: IssueKind::Gaps,
            severity: severity_for(score),
            percent_affected: (gap_total / span * 100.0).min(100.0),
            description: format!("{} sampling gaps totalling {gap_total:.0}s", gaps.len()),
            suggestion: "investigate transport outages around the gap windows".into(),
        });
    }
    score
}

/// Gaps where the inter-sample interval exceeds 2.5x the expected interval
/// (median interval when none is declared). Tolerates either time direction.
pub fn detect_gaps(timestamps: &[DateTime<Utc>], expected_interval_secs: Option<f64>) -> Vec<TimeGap> {
    if timestamps.len() < 2 {
        return Vec::new();
    }
    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds().abs() as f64 / 1000.0)
        .collect();
    let expected = expected_interval_secs
        .filter(|&e| e > 0.0)
        .unwrap_or_else(|| stats::median(&intervals));
    if expected <= 0.0 {
        return Vec::new();
    }

    timestamps
        .windows(2)
        .zip(&intervals)
        .filter(|(_, &dt)| dt > GAP_FACTOR * expected)
        .map(|(pair, &dt)| {
            let (start, end) = if pair[0] <= pair[1] {
                (pair[0], pair[1])
            } else {
                (pair[1], pair[0])
            };
            TimeGap {
                start,
                end,
                duration_secs: dt,
            }
        })
        .collect()
}

/// The `DataQuality` snapshot computed inline on every stream fetch.
pub fn snapshot(values: &[f64], timestamps: &[DateTime<Utc>], options: &QualityOptions) -> DataQuality {
    let report = assess_quality(values, timestamps, options);
    DataQuality {
        score: report.overall_score,
        issues: report.issues.iter().map(|i| i.description.clone()).collect(),
        missing_points: values.iter().filter(|v| !v.is_finite()).count(),
        gaps: detect_gaps(timestamps, options.expected_interval_secs),
    }
}

fn severity_for(score: f64) -> IssueSeverity {
    if score < 0.5 {
        IssueSeverity::High
    } else if score < 0.7 {
        IssueSeverity::Medium
    } else {
        IssueSeverity::Low
    }
}

fn span_secs(timestamps: &[DateTime<Utc>]) -> f64 {
    let min = timestamps.iter().min();
    let max = timestamps.iter().max();
    match (min, max) {
        (Some(&min), Some(&max)) => (max - min).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
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
    fn test_clean_data_grades_high() {
        let values: Vec<f64> = (0..60).map(|i| 21.0 + ((i % 4) as f64) * 0.1).collect();
        let report = assess_quality(&values, &minutely(60), &QualityOptions::default());
        assert!(report.overall_score >= 0.9, "score {}", report.overall_score);
        assert_eq!(report.grade, 'A');
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_assessment_is_idempotent() {
        let values: Vec<f64> = (0..50).map(|i| (i as f64).sin() * 3.0 + 20.0).collect();
        let ts = minutely(50);
        let first = assess_quality(&values, &ts, &QualityOptions::default());
        let second = assess_quality(&values, &ts, &QualityOptions::default());
        assert_eq!(first.overall_score, second.overall_score);
        assert_eq!(first.grade, second.grade);
        assert_eq!(first.issues.len(), second.issues.len());
    }

    #[test]
    fn test_out_of_range_penalizes_accuracy() {
        let mut values = vec![50.0; 40];
        for v in values.iter_mut().take(10) {
            *v = 150.0;
        }
        let report = assess_quality(
            &values,
            &minutely(40),
            &QualityOptions {
                expected_range: Some((0.0, 100.0)),
                ..QualityOptions::default()
            },
        );
        assert!(report.assessment.accuracy <= 0.75);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::OutOfRange));
    }

    #[test]
    fn test_gap_detection() {
        let start = Utc::now();
        let mut ts: Vec<DateTime<Utc>> = (0..20).map(|i| start + Duration::seconds(60 * i)).collect();
        // One 30-minute hole.
        for t in ts.iter_mut().skip(10) {
            *t += Duration::seconds(1800);
        }
        let gaps = detect_gaps(&ts, Some(60.0));
        assert_eq!(gaps.len(), 1);
        assert!((gaps[0].duration_secs - 1860.0).abs() < 1.0);
    }

    #[test]
    fn test_missing_values_reduce_completeness() {
        let mut values = vec![10.0; 30];
        for v in values.iter_mut().take(12) {
            *v = f64::NAN;
        }
        let report = assess_quality(&values, &minutely(30), &QualityOptions::default());
        assert!(report.assessment.completeness < 0.7);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::MissingData));
    }

    #[test]
    fn test_empty_slice_grades_f() {
        let report = assess_quality(&[], &[], &QualityOptions::default());
        assert_eq!(report.grade, 'F');
        assert_eq!(report.overall_score, 0.0);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(grade_for(0.95), 'A');
        assert_eq!(grade_for(0.9), 'A');
        assert_eq!(grade_for(0.85), 'B');
        assert_eq!(grade_for(0.72), 'C');
        assert_eq!(grade_for(0.65), 'D');
        assert_eq!(grade_for(0.3), 'F');
    }

    #[test]
    fn test_snapshot_counts_missing() {
        let values = [1.0, f64::NAN, 3.0, f64::NAN, 5.0, 6.0];
        let quality = snapshot(&values, &minutely(6), &QualityOptions::default());
        assert_eq!(quality.missing_points, 2);
        assert!(quality.score < 1.0);
    }
}
