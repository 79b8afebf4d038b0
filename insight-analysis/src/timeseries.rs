//! Trend fitting, smoothing, change-point and cyclic-pattern detection.

use insight_core::stats;
use insight_core::{InsightError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
}

/// Ordinary least squares of value against sample index.
pub fn linear_trend(values: &[f64]) -> TrendResult {
    let n = values.len();
    if n < 2 {
        return TrendResult {
            slope: 0.0,
            intercept: values.first().copied().unwrap_or(0.0),
            r_squared: 0.0,
            direction: TrendDirection::Stable,
            strength: TrendStrength::Weak,
        };
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = stats::mean(values);
    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }

    let slope = if ss_xx == 0.0 { 0.0 } else { ss_xy / ss_xx };
    let intercept = y_mean - slope * x_mean;
    let r_squared = if ss_xx == 0.0 || ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };

    let direction = if slope > 0.001 {
        TrendDirection::Up
    } else if slope < -0.001 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };
    let strength = if r_squared > 0.7 {
        TrendStrength::Strong
    } else if r_squared > 0.3 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    TrendResult {
        slope,
        intercept,
        r_squared,
        direction,
        strength,
    }
}

/// Simple moving average. The first `window - 1` points use a shrinking
/// window rather than being undefined.
pub fn simple_moving_average(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 {
        return Err(InsightError::InvalidParameter(
            "moving average window must be positive".into(),
        ));
    }
    Ok((0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            stats::mean(&values[start..=i])
        })
        .collect())
}

/// Exponential moving average with smoothing factor `2 / (window + 1)`,
/// seeded by the first value.
pub fn exponential_moving_average(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 {
        return Err(InsightError::InvalidParameter(
            "moving average window must be positive".into(),
        ));
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);
    for &v in &values[1..] {
        ema = alpha * v + (1.0 - alpha) * ema;
        out.push(ema);
    }
    Ok(out)
}

/// Moving sample standard deviation with a shrinking head window.
pub fn moving_std(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 {
        return Err(InsightError::InvalidParameter(
            "moving std window must be positive".into(),
        ));
    }
    Ok((0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            stats::std_dev(&values[start..=i])
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Upward,
    Downward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
    pub direction: ChangeDirection,
    pub before_mean: f64,
    pub after_mean: f64,
    pub magnitude: f64,
}

/// CUSUM change-point detection over z-normalized values. Upward and
/// downward accumulators run independently; a crossing emits a change point
/// with before/after means over the 10 samples each side, then resets the
/// crossed accumulator.
pub fn detect_change_points(values: &[f64], threshold: f64) -> Vec<ChangePoint> {
    let z = stats::z_scores(values);
    if z.iter().all(|&v| v == 0.0) {
        return Vec::new();
    }

    let mut change_points = Vec::new();
    let mut cusum_pos = 0.0f64;
    let mut cusum_neg = 0.0f64;

    for (i, &zi) in z.iter().enumerate() {
        cusum_pos = (cusum_pos + zi).max(0.0);
        cusum_neg = (cusum_neg + zi).min(0.0);

        if cusum_pos > threshold {
            change_points.push(make_change_point(values, i, ChangeDirection::Upward));
            cusum_pos = 0.0;
        }
        if cusum_neg < -threshold {
            change_points.push(make_change_point(values, i, ChangeDirection::Downward));
            cusum_neg = 0.0;
        }
    }

    change_points
}

fn make_change_point(values: &[f64], index: usize, direction: ChangeDirection) -> ChangePoint {
    let before_start = index.saturating_sub(10);
    let after_end = (index + 10).min(values.len());
    let before_mean = stats::mean(&values[before_start..index.max(before_start)]);
    let after_mean = stats::mean(&values[index..after_end]);
    ChangePoint {
        index,
        direction,
        before_mean,
        after_mean,
        magnitude: after_mean - before_mean,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutocorrelationResult {
    /// Coefficient per lag, starting at lag 0 (always 1 for a non-constant
    /// series).
    pub coefficients: Vec<f64>,
    /// Lags whose coefficient exceeds the 95% confidence band `1.96/sqrt(n)`.
    pub significant_lags: Vec<usize>,
    /// True when the lag-5 / lag-1 coefficient ratio exceeds 0.7.
    pub is_persistent: bool,
}

/// Autocorrelation for lags `0..=min(n/4, 50)` unless the caller caps them.
pub fn autocorrelation(values: &[f64], max_lag: Option<usize>) -> AutocorrelationResult {
    let n = values.len();
    let default_max = (n / 4).min(50);
    let max = max_lag.unwrap_or(default_max).min(n.saturating_sub(1));
    let m = stats::mean(values);
    let denom: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();

    let mut coefficients = Vec::with_capacity(max + 1);
    for lag in 0..=max {
        if denom == 0.0 {
            coefficients.push(0.0);
            continue;
        }
        let num: f64 = (0..n - lag).map(|t| (values[t] - m) * (values[t + lag] - m)).sum();
        coefficients.push(num / denom);
    }

    let band = if n > 0 { 1.96 / (n as f64).sqrt() } else { 0.0 };
    let significant_lags = coefficients
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, &c)| c.abs() > band)
        .map(|(lag, _)| lag)
        .collect();

    let is_persistent = coefficients.len() > 5
        && coefficients[1].abs() > f64::EPSILON
        && coefficients[5] / coefficients[1] > 0.7;

    AutocorrelationResult {
        coefficients,
        significant_lags,
        is_persistent,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicPattern {
    pub period: usize,
    pub strength: f64,
}

/// Candidate periods from local maxima of the autocorrelation function above
/// a strength of 0.3.
pub fn detect_cyclic_patterns(values: &[f64], max_lag: Option<usize>) -> Vec<CyclicPattern> {
    let acf = autocorrelation(values, max_lag).coefficients;
    let mut patterns = Vec::new();
    for lag in 2..acf.len().saturating_sub(1) {
        if acf[lag] > 0.3 && acf[lag] >= acf[lag - 1] && acf[lag] >= acf[lag + 1] {
            patterns.push(CyclicPattern {
                period: lag,
                strength: acf[lag],
            });
        }
    }
    patterns.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
    patterns
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalDecomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    pub period: usize,
}

/// Classical additive decomposition: moving-average trend, per-phase mean
/// seasonal component, residual remainder. Series shorter than two periods
/// degrade to `{trend = values, seasonal = 0, residual = 0}`.
pub fn seasonal_decompose(values: &[f64], period: usize) -> Result<SeasonalDecomposition> {
    if period == 0 {
        return Err(InsightError::InvalidParameter(
            "seasonal period must be positive".into(),
        ));
    }
    let n = values.len();
    if n < 2 * period {
        return Ok(SeasonalDecomposition {
            trend: values.to_vec(),
            seasonal: vec![0.0; n],
            residual: vec![0.0; n],
            period,
        });
    }

    let trend = simple_moving_average(values, period)?;

    let mut phase_sums = vec![0.0f64; period];
    let mut phase_counts = vec![0usize; period];
    for i in 0..n {
        phase_sums[i % period] += values[i] - trend[i];
        phase_counts[i % period] += 1;
    }
    let phase_means: Vec<f64> = phase_sums
        .iter()
        .zip(&phase_counts)
        .map(|(&s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect();

    let seasonal: Vec<f64> = (0..n).map(|i| phase_means[i % period]).collect();
    let residual: Vec<f64> = (0..n).map(|i| values[i] - trend[i] - seasonal[i]).collect();

    Ok(SeasonalDecomposition {
        trend,
        seasonal,
        residual,
        period,
    })
}
