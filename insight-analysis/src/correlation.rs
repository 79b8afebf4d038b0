//! Pairwise and multivariate relationship analyses: Pearson correlation,
//! lagged cross-correlation, a coarse causality approximation, synchronized
//! events and cascade detection.

use insight_core::stats;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub correlation: f64,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
}

/// Pearson correlation coefficient. Zero for mismatched lengths, fewer than
/// two samples, or a zero-variance input.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let mx = stats::mean(x);
    let my = stats::mean(y);
    let mut num = 0.0;
    let mut dx2 = 0.0;
    let mut dy2 = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        num += dx * dy;
        dx2 += dx * dx;
        dy2 += dy * dy;
    }
    if dx2 == 0.0 || dy2 == 0.0 {
        return 0.0;
    }
    num / (dx2 * dy2).sqrt()
}

/// Pearson correlation with strength tier and direction.
pub fn correlate(x: &[f64], y: &[f64]) -> CorrelationResult {
    let r = pearson(x, y);
    let magnitude = r.abs();
    let strength = if magnitude < 0.1 {
        CorrelationStrength::None
    } else if magnitude < 0.3 {
        CorrelationStrength::Weak
    } else if magnitude < 0.7 {
        CorrelationStrength::Moderate
    } else {
        CorrelationStrength::Strong
    };
    let direction = if magnitude < 0.1 {
        CorrelationDirection::None
    } else if r > 0.0 {
        CorrelationDirection::Positive
    } else {
        CorrelationDirection::Negative
    };
    CorrelationResult {
        correlation: r,
        strength,
        direction,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LagCorrelation {
    pub lag: i64,
    pub correlation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossCorrelationResult {
    pub correlations: Vec<LagCorrelation>,
    /// Lag of maximum absolute correlation. Positive means `x` leads `y`.
    pub best_lag: i64,
    pub best_correlation: f64,
}

/// Correlation swept over lags `[-L, L]` with `L = min(max_lag, n/4)`.
pub fn cross_correlation(x: &[f64], y: &[f64], max_lag: usize) -> CrossCorrelationResult {
    let n = x.len().min(y.len());
    let cap = (max_lag).min(n / 4) as i64;

    let mut correlations = Vec::new();
    let mut best_lag = 0i64;
    let mut best_correlation = 0.0f64;

    for lag in -cap..=cap {
        let r = if lag >= 0 {
            let shift = lag as usize;
            if n <= shift + 1 {
                0.0
            } else {
                pearson(&x[..n - shift], &y[shift..n])
            }
        } else {
            let shift = (-lag) as usize;
            if n <= shift + 1 {
                0.0
            } else {
                pearson(&x[shift..n], &y[..n - shift])
            }
        };
        correlations.push(LagCorrelation {
            lag,
            correlation: r,
        });
        if r.abs() > best_correlation.abs() {
            best_correlation = r;
            best_lag = lag;
        }
    }

    CrossCorrelationResult {
        correlations,
        best_lag,
        best_correlation,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongPair {
    pub first: String,
    pub second: String,
    pub correlation: f64,
    pub strength: PairStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
    /// Pairs above the significance threshold, sorted by |r| descending.
    pub strong_pairs: Vec<StrongPair>,
}

/// All pairwise correlations for a named set of series.
pub fn correlation_matrix(series: &[(String, Vec<f64>)], significance: f64) -> CorrelationMatrix {
    let k = series.len();
    let mut matrix = vec![vec![0.0f64; k]; k];
    let mut strong_pairs = Vec::new();

    for i in 0..k {
        matrix[i][i] = 1.0;
        for j in i + 1..k {
            let r = pearson(&series[i].1, &series[j].1);
            matrix[i][j] = r;
            matrix[j][i] = r;
            if r.abs() > significance {
                strong_pairs.push(StrongPair {
                    first: series[i].0.clone(),
                    second: series[j].0.clone(),
                    correlation: r,
                    strength: pair_strength(r.abs()),
                });
            }
        }
    }

    strong_pairs.sort_by(|a, b| {
        b.correlation
            .abs()
            .partial_cmp(&a.correlation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    CorrelationMatrix {
        names: series.iter().map(|(name, _)| name.clone()).collect(),
        matrix,
        strong_pairs,
    }
}

fn pair_strength(magnitude: f64) -> PairStrength {
    if magnitude >= 0.9 {
        PairStrength::VeryStrong
    } else if magnitude >= 0.7 {
        PairStrength::Strong
    } else if magnitude >= 0.5 {
        PairStrength::Moderate
    } else {
        PairStrength::Weak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalDirection {
    XCausesY,
    YCausesX,
    Bidirectional,
    NoCausality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalityResult {
    pub direction: CausalDirection,
    /// Lag (in samples) with the greatest error reduction.
    pub lag: usize,
    /// Best relative prediction-error reduction when `x` helps predict `y`.
    pub improvement_x_to_y: f64,
    /// Best relative prediction-error reduction when `y` helps predict `x`.
    pub improvement_y_to_x: f64,
}

/// Minimum relative error reduction for a direction to count as causal.
const CAUSAL_IMPROVEMENT_FLOOR: f64 = 0.05;

/// Coarse Granger-style causality approximation. For each lag the one-step
/// prediction error of a pure autoregressive model is compared against a
/// model blending the candidate predictor with fixed 0.7/0.3 weights. The
/// blend weights are intentionally not fitted; downstream thresholds are
/// calibrated against this exact heuristic.
pub fn causality_approximation(x: &[f64], y: &[f64], max_lag: usize) -> CausalityResult {
    let n = x.len().min(y.len());
    let max_lag = max_lag.max(1);
    if n < max_lag + 2 {
        return CausalityResult {
            direction: CausalDirection::NoCausality,
            lag: 0,
            improvement_x_to_y: 0.0,
            improvement_y_to_x: 0.0,
        };
    }

    let mut best_xy = (0usize, 0.0f64);
    let mut best_yx = (0usize, 0.0f64);
    for lag in 1..=max_lag {
        let impr_xy = blend_improvement(&x[..n], &y[..n], lag);
        if impr_xy > best_xy.1 {
            best_xy = (lag, impr_xy);
        }
        let impr_yx = blend_improvement(&y[..n], &x[..n], lag);
        if impr_yx > best_yx.1 {
            best_yx = (lag, impr_yx);
        }
    }

    let xy_causal = best_xy.1 > CAUSAL_IMPROVEMENT_FLOOR;
    let yx_causal = best_yx.1 > CAUSAL_IMPROVEMENT_FLOOR;
    let (direction, lag) = match (xy_causal, yx_causal) {
        (true, true) => {
            let lag = if best_xy.1 >= best_yx.1 {
                best_xy.0
            } else {
                best_yx.0
            };
            (CausalDirection::Bidirectional, lag)
        }
        (true, false) => (CausalDirection::XCausesY, best_xy.0),
        (false, true) => (CausalDirection::YCausesX, best_yx.0),
        (false, false) => (CausalDirection::NoCausality, 0),
    };

    debug!(
        ?direction,
        lag,
        improvement_x_to_y = best_xy.1,
        improvement_y_to_x = best_yx.1,
        "causality approximation complete"
    );

    CausalityResult {
        direction,
        lag,
        improvement_x_to_y: best_xy.1,
        improvement_y_to_x: best_yx.1,
    }
}

/// Relative MSE reduction of predicting `target[t]` from
/// `0.7 * target[t-1] + 0.3 * predictor[t-lag]` versus `target[t-1]` alone.
fn blend_improvement(predictor: &[f64], target: &[f64], lag: usize) -> f64 {
    let n = target.len();
    if n <= lag || n < 2 {
        return 0.0;
    }
    let start = lag.max(1);
    let mut err_ar = 0.0;
    let mut err_blend = 0.0;
    let mut count = 0usize;
    for t in start..n {
        let ar = target[t - 1];
        let blend = 0.7 * target[t - 1] + 0.3 * predictor[t - lag];
        err_ar += (target[t] - ar) * (target[t] - ar);
        err_blend += (target[t] - blend) * (target[t] - blend);
        count += 1;
    }
    if count == 0 || err_ar == 0.0 {
        return 0.0;
    }
    (err_ar - err_blend) / err_ar
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizedEvent {
    /// Sample index of the strongest excursion within the merged window.
    pub index: usize,
    /// Streams that exceeded the threshold, union over the merged window.
    pub streams: Vec<String>,
    /// Largest |z| observed across the involved streams.
    pub magnitude: f64,
}

/// Indices where at least two series simultaneously exceed the z-score
/// threshold. Events closer than `time_window` samples are merged.
pub fn synchronized_events(
    series: &[(String, Vec<f64>)],
    threshold: f64,
    time_window: usize,
) -> Vec<SynchronizedEvent> {
    if series.len() < 2 {
        return Vec::new();
    }
    let n = series.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
    let z: Vec<Vec<f64>> = series.iter().map(|(_, v)| stats::z_scores(&v[..n])).collect();

    let mut events: Vec<SynchronizedEvent> = Vec::new();
    for t in 0..n {
        let mut involved = Vec::new();
        let mut magnitude = 0.0f64;
        for (s, (name, _)) in z.iter().zip(series) {
            if s[t].abs() > threshold {
                involved.push(name.clone());
                magnitude = magnitude.max(s[t].abs());
            }
        }
        if involved.len() < 2 {
            continue;
        }

        match events.last_mut() {
            Some(last) if t - last.index <= time_window => {
                for name in involved {
                    if !last.streams.contains(&name) {
                        last.streams.push(name);
                    }
                }
                if magnitude > last.magnitude {
                    last.magnitude = magnitude;
                    last.index = t;
                }
            }
            _ => events.push(SynchronizedEvent {
                index: t,
                streams: involved,
                magnitude,
            }),
        }
    }

    events
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeFollower {
    pub stream: String,
    /// Samples by which the follower trails the initiator.
    pub delay: usize,
    pub correlation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeResult {
    pub initiator: String,
    pub followers: Vec<CascadeFollower>,
    /// Mean |r| across followers; cascades are ranked by this.
    pub strength: f64,
}

/// Delayed-correlation cascade detection: for every ordered pair, the delay
/// in `1..=max_delay` with the strongest correlation is kept; initiators
/// with at least one follower above 0.4 are reported.
pub fn cascading_failures(series: &[(String, Vec<f64>)], max_delay: usize) -> Vec<CascadeResult> {
    let n = series.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
    let mut cascades = Vec::new();

    for (i, (initiator, leader)) in series.iter().enumerate() {
        let mut followers = Vec::new();
        for (j, (name, follower)) in series.iter().enumerate() {
            if i == j {
                continue;
            }
            let mut best_delay = 0usize;
            let mut best_r = 0.0f64;
            for delay in 1..=max_delay.min(n.saturating_sub(2)) {
                let r = pearson(&leader[..n - delay], &follower[delay..n]);
                if r.abs() > best_r.abs() {
                    best_r = r;
                    best_delay = delay;
                }
            }
            if best_r.abs() > 0.4 {
                followers.push(CascadeFollower {
                    stream: name.clone(),
                    delay: best_delay,
                    correlation: best_r,
                });
            }
        }
        if !followers.is_empty() {
            let strength =
                followers.iter().map(|f| f.correlation.abs()).sum::<f64>() / followers.len() as f64;
            followers.sort_by(|a, b| {
                b.correlation
                    .abs()
                    .partial_cmp(&a.correlation.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            cascades.push(CascadeResult {
                initiator: initiator.clone(),
                followers,
                strength,
            });
        }
    }

    cascades.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    cascades
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, period: f64, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (i as f64 * 2.0 * std::f64::consts::PI / period + phase).sin())
            .collect()
    }

    #[test]
    fn test_self_correlation_is_one() {
        let series = [1.0, 4.0, 2.0, 8.0, 5.0, 7.0];
        let result = correlate(&series, &series);
        assert!((result.correlation - 1.0).abs() < 1e-12);
        assert_eq!(result.strength, CorrelationStrength::Strong);
        assert_eq!(result.direction, CorrelationDirection::Positive);
    }

    #[test]
    fn test_degenerate_inputs_yield_none() {
        let constant = [5.0; 6];
        let varied = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = correlate(&constant, &varied);
        assert_eq!(result.correlation, 0.0);
        assert_eq!(result.strength, CorrelationStrength::None);
        assert_eq!(result.direction, CorrelationDirection::None);

        let mismatched = correlate(&[1.0, 2.0], &[1.0, 2.0, 3.0]);
        assert_eq!(mismatched.correlation, 0.0);
    }

    #[test]
    fn test_in_phase_sines_strong_at_lag_zero() {
        let x = sine(80, 40.0, 0.0);
        let y = sine(80, 40.0, 0.0);
        let result = correlate(&x, &y);
        assert_eq!(result.strength, CorrelationStrength::Strong);
        assert_eq!(result.direction, CorrelationDirection::Positive);

        let cross = cross_correlation(&x, &y, 10);
        assert_eq!(cross.best_lag, 0);
        assert!((cross.best_correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_correlation_finds_shift() {
        let x = sine(100, 40.0, 0.0);
        // y is x delayed by 5 samples.
        let y: Vec<f64> = (0..100)
            .map(|i| {
                if i < 5 {
                    0.0
                } else {
                    x[i - 5]
                }
            })
            .collect();
        let cross = cross_correlation(&x, &y, 10);
        assert_eq!(cross.best_lag, 5);
        assert!(cross.best_correlation > 0.9);
    }

    #[test]
    fn test_correlation_matrix_strong_pairs_sorted() {
        let base: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let inverse: Vec<f64> = base.iter().map(|v| -v).collect();
        let noise: Vec<f64> = (0..50).map(|i| ((i * 7919) % 13) as f64).collect();
        let series = vec![
            ("a".to_string(), base.clone()),
            ("b".to_string(), base),
            ("c".to_string(), inverse),
            ("d".to_string(), noise),
        ];
        let matrix = correlation_matrix(&series, 0.5);
        assert_eq!(matrix.names.len(), 4);
        assert!((matrix.matrix[0][1] - 1.0).abs() < 1e-12);
        assert!((matrix.matrix[0][2] + 1.0).abs() < 1e-12);
        assert!(matrix.strong_pairs.len() >= 3);
        assert_eq!(matrix.strong_pairs[0].strength, PairStrength::VeryStrong);
        for pair in matrix.strong_pairs.windows(2) {
            assert!(pair[0].correlation.abs() >= pair[1].correlation.abs());
        }
    }

    #[test]
    fn test_causality_detects_leader() {
        // y follows x with a 2-sample delay plus its own inertia.
        let x: Vec<f64> = (0..120)
            .map(|i| (i as f64 * 2.0 * std::f64::consts::PI / 15.0).sin() * 10.0)
            .collect();
        let mut y = vec![0.0f64; 120];
        for t in 2..120 {
            y[t] = 0.4 * y[t - 1] + 0.6 * x[t - 2];
        }
        let result = causality_approximation(&x, &y, 5);
        assert_eq!(result.direction, CausalDirection::XCausesY);
        assert!(result.improvement_x_to_y > result.improvement_y_to_x);
    }

    #[test]
    fn test_causality_insufficient_data() {
        let result = causality_approximation(&[1.0, 2.0], &[2.0, 1.0], 5);
        assert_eq!(result.direction, CausalDirection::NoCausality);
    }

    #[test]
    fn test_synchronized_events_merge() {
        let mut a = vec![10.0; 50];
        let mut b = vec![5.0; 50];
        a[20] = 50.0;
        b[21] = 40.0;
        a[22] = 48.0;
        b[22] = 39.0;
        let series = vec![("a".to_string(), a), ("b".to_string(), b)];
        let events = synchronized_events(&series, 2.0, 3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].streams.len(), 2);
        assert!(events[0].magnitude > 2.0);
    }

    #[test]
    fn test_cascading_failures_orders_by_strength() {
        let leader: Vec<f64> = (0..60).map(|i| ((i / 10) % 2) as f64 * 10.0).collect();
        let follower: Vec<f64> = (0..60)
            .map(|i| {
                if i < 3 {
                    0.0
                } else {
                    ((((i - 3) / 10) % 2) as f64) * 10.0
                }
            })
            .collect();
        let series = vec![
            ("leader".to_string(), leader),
            ("follower".to_string(), follower),
        ];
        let cascades = cascading_failures(&series, 5);
        assert!(!cascades.is_empty());
        let leader_cascade = cascades
            .iter()
            .find(|c| c.initiator == "leader")
            .expect("leader should initiate a cascade");
        assert_eq!(leader_cascade.followers[0].stream, "follower");
        assert_eq!(leader_cascade.followers[0].delay, 3);
        assert!(leader_cascade.followers[0].correlation > 0.9);
    }
}
