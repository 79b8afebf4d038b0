//! Peak/valley discovery, spike runs, template matching, repeating-sequence
//! and dominant-frequency detection.

use crate::timeseries::autocorrelation;
use insight_core::stats;
use insight_core::{InsightError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    /// Height above the higher of the two neighboring inflection minima.
    pub prominence: f64,
    /// Width of the peak at half its prominence, in samples.
    pub width: f64,
}

#[derive(Debug, Clone)]
pub struct PeakOptions {
    /// Minimum height; defaults to `mean + std` for peaks and `mean - std`
    /// for valleys.
    pub threshold: Option<f64>,
    /// Minimum spacing between reported extrema; the higher one wins.
    pub min_distance: usize,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            min_distance: 1,
        }
    }
}

/// Local maxima above the threshold, spaced at least `min_distance` apart.
pub fn find_peaks(values: &[f64], options: &PeakOptions) -> Vec<Peak> {
    let threshold = options
        .threshold
        .unwrap_or_else(|| stats::mean(values) + stats::std_dev(values));
    let candidates = local_maxima(values, threshold);
    let spaced = enforce_spacing(values, candidates, options.min_distance);
    spaced
        .into_iter()
        .map(|i| describe_peak(values, i))
        .collect()
}

/// Local minima below the threshold, reported with positive prominence.
pub fn find_valleys(values: &[f64], options: &PeakOptions) -> Vec<Peak> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    let threshold = options
        .threshold
        .map(|t| -t)
        .unwrap_or_else(|| stats::mean(&negated) + stats::std_dev(&negated));
    let candidates = local_maxima(&negated, threshold);
    let spaced = enforce_spacing(&negated, candidates, options.min_distance);
    spaced
        .into_iter()
        .map(|i| {
            let peak = describe_peak(&negated, i);
            Peak {
                index: peak.index,
                value: values[peak.index],
                prominence: peak.prominence,
                width: peak.width,
            }
        })
        .collect()
}

fn local_maxima(values: &[f64], threshold: f64) -> Vec<usize> {
    (1..values.len().saturating_sub(1))
        .filter(|&i| {
            values[i] > values[i - 1] && values[i] > values[i + 1] && values[i] > threshold
        })
        .collect()
}

fn enforce_spacing(values: &[f64], mut candidates: Vec<usize>, min_distance: usize) -> Vec<usize> {
    if min_distance <= 1 {
        return candidates;
    }
    // Greedy by height: the tallest candidate suppresses nearby smaller ones.
    candidates.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<usize> = Vec::new();
    for idx in candidates {
        if kept.iter().all(|&k| k.abs_diff(idx) >= min_distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

fn describe_peak(values: &[f64], index: usize) -> Peak {
    let height = values[index];

    let mut left_min = height;
    for i in (0..index).rev() {
        if values[i] > height {
            break;
        }
        left_min = left_min.min(values[i]);
    }
    let mut right_min = height;
    for &v in &values[index + 1..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    let prominence = height - left_min.max(right_min);
    let half_height = height - prominence / 2.0;

    let mut left_edge = index;
    while left_edge > 0 && values[left_edge - 1] >= half_height {
        left_edge -= 1;
    }
    let mut right_edge = index;
    while right_edge + 1 < values.len() && values[right_edge + 1] >= half_height {
        right_edge += 1;
    }

    Peak {
        index,
        value: height,
        prominence,
        width: (right_edge - left_edge) as f64,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeDirection {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spike {
    pub start: usize,
    pub end: usize,
    pub peak_index: usize,
    /// Extremum deviation from the mean, in standard deviations.
    pub magnitude: f64,
    pub direction: SpikeDirection,
}

/// Contiguous runs where |z| exceeds the threshold, split whenever the
/// deviation direction flips.
pub fn detect_spikes(values: &[f64], threshold: f64) -> Vec<Spike> {
    let z = stats::z_scores(values);
    let mut spikes = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_sign = 0i8;

    for i in 0..=z.len() {
        let sign = if i < z.len() && z[i].abs() > threshold {
            if z[i] > 0.0 {
                1
            } else {
                -1
            }
        } else {
            0
        };

        if sign != run_sign {
            if let Some(start) = run_start.take() {
                spikes.push(close_spike(&z, start, i));
            }
            if sign != 0 {
                run_start = Some(i);
            }
            run_sign = sign;
        }
    }

    spikes
}

fn close_spike(z: &[f64], start: usize, end: usize) -> Spike {
    let peak_index = (start..end)
        .max_by(|&a, &b| {
            z[a].abs()
                .partial_cmp(&z[b].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(start);
    Spike {
        start,
        end: end - 1,
        peak_index,
        magnitude: z[peak_index].abs(),
        direction: if z[peak_index] > 0.0 {
            SpikeDirection::Positive
        } else {
            SpikeDirection::Negative
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub index: usize,
    pub similarity: f64,
}

/// Sliding-window Pearson correlation of a z-normalized template against
/// z-normalized windows of the series. Overlapping matches are allowed;
/// results are ranked by similarity, descending.
pub fn match_template(
    values: &[f64],
    template: &[f64],
    min_similarity: f64,
) -> Result<Vec<TemplateMatch>> {
    if template.len() < 2 {
        return Err(InsightError::InvalidParameter(
            "template must contain at least two samples".into(),
        ));
    }
    if values.len() < template.len() {
        return Ok(Vec::new());
    }

    let template_z = stats::z_scores(template);
    let mut matches = Vec::new();
    for start in 0..=values.len() - template.len() {
        let window = &values[start..start + template.len()];
        let window_z = stats::z_scores(window);
        let similarity = crate::correlation::pearson(&template_z, &window_z);
        if similarity >= min_similarity {
            matches.push(TemplateMatch {
                index: start,
                similarity,
            });
        }
    }
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(matches)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatingSequence {
    pub length: usize,
    pub signature: String,
    /// Non-overlapping start indices.
    pub occurrences: Vec<usize>,
}

/// Buckets windows of each candidate length by a rounded-value signature
/// (one decimal place) and reports signatures with at least
/// `min_occurrences` non-overlapping placements.
pub fn find_repeating_sequences(
    values: &[f64],
    min_length: usize,
    max_length: usize,
    min_occurrences: usize,
) -> Result<Vec<RepeatingSequence>> {
    if min_length < 2 || max_length < min_length {
        return Err(InsightError::InvalidParameter(format!(
            "invalid sequence length bounds [{min_length}, {max_length}]"
        )));
    }

    let mut sequences = Vec::new();
    for length in min_length..=max_length.min(values.len()) {
        let mut buckets: std::collections::HashMap<String, Vec<usize>> =
            std::collections::HashMap::new();
        for start in 0..=values.len() - length {
            let signature = values[start..start + length]
                .iter()
                .map(|v| format!("{v:.1}"))
                .join(",");
            buckets.entry(signature).or_default().push(start);
        }

        for (signature, starts) in buckets {
            let occurrences = non_overlapping(&starts, length);
            if occurrences.len() >= min_occurrences {
                sequences.push(RepeatingSequence {
                    length,
                    signature,
                    occurrences,
                });
            }
        }
    }

    sequences.sort_by(|a, b| {
        b.occurrences
            .len()
            .cmp(&a.occurrences.len())
            .then(b.length.cmp(&a.length))
    });
    Ok(sequences)
}

fn non_overlapping(starts: &[usize], length: usize) -> Vec<usize> {
    let mut kept = Vec::new();
    let mut next_free = 0usize;
    for &start in starts {
        if start >= next_free {
            kept.push(start);
            next_free = start + length;
        }
    }
    kept
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyComponent {
    /// Period in samples (the autocorrelation lag of the peak).
    pub period: usize,
    /// Cycles per sample (`1 / period`).
    pub frequency: f64,
    /// `sqrt` of the autocorrelation at the peak lag.
    pub amplitude: f64,
}

/// Approximate spectral peaks via local maxima of the autocorrelation
/// function.
pub fn dominant_frequencies(values: &[f64], max_lag: Option<usize>) -> Vec<FrequencyComponent> {
    let acf = autocorrelation(values, max_lag).coefficients;
    let mut components = Vec::new();
    for lag in 2..acf.len().saturating_sub(1) {
        if acf[lag] > 0.0 && acf[lag] >= acf[lag - 1] && acf[lag] >= acf[lag + 1] {
            components.push(FrequencyComponent {
                period: lag,
                frequency: 1.0 / lag as f64,
                amplitude: acf[lag].max(0.0).sqrt(),
            });
        }
    }
    components.sort_by(|a, b| {
        b.amplitude
            .partial_cmp(&a.amplitude)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    components
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakRegularity {
    pub peak_count: usize,
    pub mean_interval: f64,
    /// Coefficient of variation of inter-peak intervals.
    pub interval_cv: f64,
    /// True when the interval CV is below 0.3.
    pub is_regular: bool,
}

/// Regularity of peak spacing, from the coefficient of variation of the
/// intervals between detected peaks.
pub fn peak_regularity(values: &[f64], options: &PeakOptions) -> PeakRegularity {
    let peaks = find_peaks(values, options);
    if peaks.len() < 2 {
        return PeakRegularity {
            peak_count: peaks.len(),
            mean_interval: 0.0,
            interval_cv: 0.0,
            is_regular: false,
        };
    }
    let intervals: Vec<f64> = peaks
        .windows(2)
        .map(|pair| (pair[1].index - pair[0].index) as f64)
        .collect();
    let mean_interval = stats::mean(&intervals);
    let interval_cv = if mean_interval == 0.0 {
        0.0
    } else {
        stats::std_dev(&intervals) / mean_interval
    };
    PeakRegularity {
        peak_count: peaks.len(),
        mean_interval,
        interval_cv,
        is_regular: interval_cv < 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sawtooth(cycles: usize) -> Vec<f64> {
        let mut values = Vec::new();
        for _ in 0..cycles {
            values.extend_from_slice(&[0.0, 2.0, 8.0, 2.0, 0.0, -1.0]);
        }
        values
    }

    #[test]
    fn test_find_peaks_basic() {
        let values = sawtooth(4);
        let peaks = find_peaks(&values, &PeakOptions::default());
        assert_eq!(peaks.len(), 4);
        assert!(peaks.iter().all(|p| p.value == 8.0));
        assert!(peaks.iter().all(|p| p.prominence > 0.0));
    }

    #[test]
    fn test_find_valleys_basic() {
        let values = sawtooth(3);
        let valleys = find_valleys(
            &values,
            &PeakOptions {
                threshold: Some(-0.5),
                min_distance: 1,
            },
        );
        assert!(!valleys.is_empty());
        assert!(valleys.iter().all(|v| v.value == -1.0));
    }

    #[test]
    fn test_min_distance_keeps_higher_peak() {
        let values = [0.0, 5.0, 0.0, 6.0, 0.0];
        let peaks = find_peaks(
            &values,
            &PeakOptions {
                threshold: Some(1.0),
                min_distance: 3,
            },
        );
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 3);
    }

    #[test]
    fn test_detect_spikes_direction_split() {
        let mut values = vec![10.0; 40];
        values[15] = 40.0;
        values[30] = -20.0;
        let spikes = detect_spikes(&values, 2.0);
        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].peak_index, 15);
        assert_eq!(spikes[0].direction, SpikeDirection::Positive);
        assert_eq!(spikes[1].peak_index, 30);
        assert_eq!(spikes[1].direction, SpikeDirection::Negative);
    }

    #[test]
    fn test_detect_spikes_constant_is_empty() {
        assert!(detect_spikes(&[3.0; 20], 2.0).is_empty());
    }

    #[test]
    fn test_template_self_match() {
        let values = [1.0, 3.0, 7.0, 3.0, 1.0, 0.0, 1.0, 3.0, 7.0, 3.0, 1.0];
        let template = [1.0, 3.0, 7.0, 3.0, 1.0];
        let matches = match_template(&values, &template, 0.95).unwrap();
        assert!(matches.len() >= 2);
        assert!((matches[0].similarity - 1.0).abs() < 1e-9);
        let indices: Vec<usize> = matches.iter().map(|m| m.index).collect();
        assert!(indices.contains(&0));
        assert!(indices.contains(&6));
    }

    #[test]
    fn test_template_too_short_rejected() {
        assert!(match_template(&[1.0, 2.0, 3.0], &[1.0], 0.5).is_err());
    }

    #[test]
    fn test_repeating_sequences() {
        let values = [1.0, 2.0, 3.0, 9.0, 1.0, 2.0, 3.0, 8.0, 1.0, 2.0, 3.0];
        let sequences = find_repeating_sequences(&values, 3, 3, 3).unwrap();
        assert!(!sequences.is_empty());
        let best = &sequences[0];
        assert_eq!(best.occurrences, vec![0, 4, 8]);
    }

    #[test]
    fn test_repeating_sequences_bad_bounds() {
        assert!(find_repeating_sequences(&[1.0, 2.0], 1, 3, 2).is_err());
        assert!(find_repeating_sequences(&[1.0, 2.0], 4, 3, 2).is_err());
    }

    #[test]
    fn test_dominant_frequency_of_sine() {
        let values: Vec<f64> = (0..100)
            .map(|i| (i as f64 * std::f64::consts::PI / 5.0).sin())
            .collect();
        let components = dominant_frequencies(&values, None);
        assert!(!components.is_empty());
        assert!(components[0].period >= 9 && components[0].period <= 11);
    }

    #[test]
    fn test_peak_regularity_periodic() {
        let values = sawtooth(6);
        let regularity = peak_regularity(&values, &PeakOptions::default());
        assert_eq!(regularity.peak_count, 6);
        assert!(regularity.is_regular);
        assert!((regularity.mean_interval - 6.0).abs() < 1e-9);
    }
}
