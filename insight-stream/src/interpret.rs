//! Plain-language interpretations and method confidences attached to every
//! analysis envelope.

use insight_analysis::correlation::{
    CausalDirection, CausalityResult, CorrelationMatrix, CorrelationResult, CorrelationStrength,
    CrossCorrelationResult,
};
use insight_analysis::timeseries::{ChangePoint, TrendDirection, TrendResult, TrendStrength};
use insight_anomaly::{Anomaly, EnsembleAnomaly};

/// Baseline confidence from sample size alone; saturates at 100 samples.
pub fn sample_confidence(n: usize) -> f64 {
    (n as f64 / 100.0).clamp(0.0, 1.0)
}

pub fn trend(result: &TrendResult, unit: &str) -> String {
    let direction = match result.direction {
        TrendDirection::Up => "rising",
        TrendDirection::Down => "falling",
        TrendDirection::Stable => "stable",
    };
    let strength = match result.strength {
        TrendStrength::Strong => "strong",
        TrendStrength::Moderate => "moderate",
        TrendStrength::Weak => "weak",
    };
    if result.direction == TrendDirection::Stable {
        format!("no meaningful trend (slope {:.4} {unit}/sample)", result.slope)
    } else {
        format!(
            "{strength} {direction} trend of {:.4} {unit}/sample (R² {:.2})",
            result.slope, result.r_squared
        )
    }
}

pub fn anomalies(anomalies: &[Anomaly], n: usize) -> String {
    if anomalies.is_empty() {
        return format!("no anomalies in {n} samples");
    }
    let max = anomalies
        .iter()
        .map(|a| a.score)
        .fold(f64::NEG_INFINITY, f64::max);
    format!(
        "{} of {} samples anomalous ({:.1}%), strongest score {:.2}",
        anomalies.len(),
        n,
        anomalies.len() as f64 / n.max(1) as f64 * 100.0,
        max
    )
}

/// Confidence in a scan outcome: high for clean data, the mean per-anomaly
/// confidence otherwise.
pub fn anomaly_confidence(confidences: &[f64], n: usize) -> f64 {
    if confidences.is_empty() {
        return sample_confidence(n).max(0.5);
    }
    confidences.iter().sum::<f64>() / confidences.len() as f64
}

pub fn ensemble(anomalies: &[EnsembleAnomaly], n: usize, methods: usize) -> String {
    if anomalies.is_empty() {
        return format!("no consensus anomalies across {methods} methods in {n} samples");
    }
    let unanimous = anomalies.iter().filter(|a| a.consensus >= 1.0).count();
    format!(
        "{} consensus anomalies from {methods} methods ({unanimous} unanimous)",
        anomalies.len()
    )
}

pub fn change_points(points: &[ChangePoint]) -> String {
    if points.is_empty() {
        return "no regime changes detected".to_string();
    }
    let strongest = points
        .iter()
        .max_by(|a, b| {
            a.magnitude
                .abs()
                .partial_cmp(&b.magnitude.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|p| p.magnitude)
        .unwrap_or(0.0);
    format!(
        "{} regime changes, largest level shift {strongest:.2}",
        points.len()
    )
}

pub fn correlation(result: &CorrelationResult, first: &str, second: &str) -> String {
    match result.strength {
        CorrelationStrength::None => {
            format!("no linear relationship between {first} and {second}")
        }
        _ => {
            let strength = format!("{:?}", result.strength).to_lowercase();
            let direction = format!("{:?}", result.direction).to_lowercase();
            format!(
                "{strength} {direction} correlation of {:.2} between {first} and {second}",
                result.correlation
            )
        }
    }
}

pub fn cross_correlation(result: &CrossCorrelationResult, first: &str, second: &str) -> String {
    if result.best_correlation.abs() < 0.1 {
        return format!("no lagged relationship between {first} and {second}");
    }
    if result.best_lag == 0 {
        format!(
            "strongest coupling is simultaneous (r {:.2})",
            result.best_correlation
        )
    } else if result.best_lag > 0 {
        format!(
            "{first} leads {second} by {} samples (r {:.2})",
            result.best_lag, result.best_correlation
        )
    } else {
        format!(
            "{second} leads {first} by {} samples (r {:.2})",
            -result.best_lag, result.best_correlation
        )
    }
}

pub fn causality(result: &CausalityResult, first: &str, second: &str) -> String {
    match result.direction {
        CausalDirection::XCausesY => format!(
            "{first} helps predict {second} at lag {} ({:.0}% error reduction)",
            result.lag,
            result.improvement_x_to_y * 100.0
        ),
        CausalDirection::YCausesX => format!(
            "{second} helps predict {first} at lag {} ({:.0}% error reduction)",
            result.lag,
            result.improvement_y_to_x * 100.0
        ),
        CausalDirection::Bidirectional => {
            format!("{first} and {second} are mutually predictive at lag {}", result.lag)
        }
        CausalDirection::NoCausality => {
            format!("neither {first} nor {second} improves prediction of the other")
        }
    }
}

pub fn matrix(result: &CorrelationMatrix) -> String {
    if result.strong_pairs.is_empty() {
        return format!(
            "no significant pairings among {} streams",
            result.names.len()
        );
    }
    let top = &result.strong_pairs[0];
    format!(
        "{} significant pairings among {} streams, strongest {} / {} at {:.2}",
        result.strong_pairs.len(),
        result.names.len(),
        top.first,
        top.second,
        top.correlation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_analysis::timeseries::linear_trend;

    #[test]
    fn test_sample_confidence_saturates() {
        assert_eq!(sample_confidence(0), 0.0);
        assert_eq!(sample_confidence(50), 0.5);
        assert_eq!(sample_confidence(500), 1.0);
    }

    #[test]
    fn test_trend_wording() {
        let rising: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let text = trend(&linear_trend(&rising), "°C");
        assert!(text.contains("strong"));
        assert!(text.contains("rising"));

        let flat = vec![5.0; 50];
        assert!(trend(&linear_trend(&flat), "°C").contains("no meaningful trend"));
    }

    #[test]
    fn test_empty_anomaly_summary() {
        assert_eq!(anomalies(&[], 40), "no anomalies in 40 samples");
        assert!(anomaly_confidence(&[], 40) >= 0.4);
    }
}
