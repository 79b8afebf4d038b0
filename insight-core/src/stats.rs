//! Core statistical primitives used by every analytic component.
//!
//! Degenerate inputs (empty slices, zero variance, too few samples for a
//! moment) return well-defined zero results instead of erroring; downstream
//! components rely on that contract. Only a parameter-contract violation
//! (an out-of-range quantile) propagates as an error.

use crate::{InsightError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n-1 denominator). Zero for fewer than two samples.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Linear-interpolated quantile. `q` must lie in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&q) {
        return Err(InsightError::InvalidParameter(format!(
            "quantile must be in [0, 1], got {q}"
        )));
    }
    if values.is_empty() {
        return Ok(0.0);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return Ok(sorted[lower]);
    }
    let fraction = position - lower as f64;
    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Interquartile range (Q3 - Q1).
pub fn iqr(values: &[f64]) -> f64 {
    let q1 = quantile(values, 0.25).unwrap_or(0.0);
    let q3 = quantile(values, 0.75).unwrap_or(0.0);
    q3 - q1
}

/// Third standardized moment. Zero for fewer than three samples or a
/// zero-variance series.
pub fn skewness(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let m = mean(values);
    let n = values.len() as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    m3 / m2.powf(1.5)
}

/// Fourth standardized moment minus 3. Zero for fewer than four samples or a
/// zero-variance series.
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    if values.len() < 4 {
        return 0.0;
    }
    let m = mean(values);
    let n = values.len() as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    m4 / (m2 * m2) - 3.0
}

/// Z-score of every sample. All zeros when the series has no spread.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let s = std_dev(values);
    if s == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - m) / s).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalityCheck {
    pub is_normal: bool,
    pub p_value: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

/// Shape-based normality heuristic. Flags non-normal when |skewness| >= 2 or
/// |excess kurtosis| >= 7; the p-value is an engineering approximation for
/// ranking, not inference.
pub fn check_normality(values: &[f64]) -> NormalityCheck {
    let skew = skewness(values);
    let kurt = excess_kurtosis(values);
    let deviation = (skew.abs() / 2.0).max(kurt.abs() / 7.0);
    NormalityCheck {
        is_normal: skew.abs() < 2.0 && kurt.abs() < 7.0,
        p_value: (1.0 - deviation).clamp(0.0, 1.0),
        skewness: skew,
        excess_kurtosis: kurt,
    }
}

/// Gaussian density at `x`. Zero for a non-positive standard deviation.
pub fn gaussian_pdf(x: f64, mean: f64, std: f64) -> f64 {
    match Normal::new(mean, std) {
        Ok(dist) => dist.pdf(x),
        Err(_) => 0.0,
    }
}

/// Histogram-based Shannon entropy in bits. A zero-width value range (or an
/// empty series) yields zero entropy.
pub fn shannon_entropy(values: &[f64], bins: usize) -> f64 {
    if values.is_empty() || bins == 0 {
        return 0.0;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bins as f64;
    if width == 0.0 {
        return 0.0;
    }
    let mut counts = vec![0usize; bins];
    for v in values {
        let bin = (((v - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let n = values.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_is_order_independent() {
        let a = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0];
        let b = [9.0, 5.0, 1.0, 4.0, 1.0, 3.0];
        assert_eq!(mean(&a), mean(&b));
    }

    #[test]
    fn test_std_single_element_is_zero() {
        assert_eq!(std_dev(&[42.0]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_known_series_moments() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((mean(&values) - 3.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.5f64.sqrt()).abs() < 1e-12);
        assert!((variance(&values) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_quantile_half_equals_median() {
        let series = [7.0, 2.0, 9.0, 4.0, 1.0, 6.0];
        assert!((quantile(&series, 0.5).unwrap() - median(&series)).abs() < 1e-12);
        let odd = [5.0, 3.0, 8.0];
        assert!((quantile(&odd, 0.5).unwrap() - median(&odd)).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_out_of_range_rejected() {
        assert!(quantile(&[1.0, 2.0], 1.5).is_err());
        assert!(quantile(&[1.0, 2.0], -0.1).is_err());
    }

    #[test]
    fn test_constant_series_has_no_shape() {
        let values = [5.0; 5];
        assert_eq!(std_dev(&values), 0.0);
        assert_eq!(skewness(&values), 0.0);
        assert_eq!(excess_kurtosis(&values), 0.0);
        assert!(z_scores(&values).iter().all(|&z| z == 0.0));
    }

    #[test]
    fn test_empty_input_yields_zeros() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(skewness(&[]), 0.0);
        assert_eq!(iqr(&[]), 0.0);
        assert_eq!(shannon_entropy(&[], 10), 0.0);
    }

    #[test]
    fn test_normality_flags_heavy_skew() {
        // One huge value drags the third moment far past the 2.0 cutoff.
        let mut values = vec![1.0; 30];
        values.push(1000.0);
        let check = check_normality(&values);
        assert!(!check.is_normal);
        assert_eq!(check.p_value, 0.0);

        let symmetric: Vec<f64> = (0..40).map(|i| (i % 5) as f64).collect();
        assert!(check_normality(&symmetric).is_normal);
    }

    #[test]
    fn test_gaussian_pdf_degenerate_std() {
        assert_eq!(gaussian_pdf(0.0, 0.0, 0.0), 0.0);
        let peak = gaussian_pdf(0.0, 0.0, 1.0);
        assert!((peak - 0.3989422804014327).abs() < 1e-12);
    }

    #[test]
    fn test_entropy_constant_is_zero() {
        assert_eq!(shannon_entropy(&[2.0; 20], 10), 0.0);
        // Uniform spread across bins approaches log2(bins).
        let spread: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let entropy = shannon_entropy(&spread, 10);
        assert!(entropy > 3.0 && entropy <= 10.0f64.log2() + 1e-9);
    }
}
