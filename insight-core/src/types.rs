use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single raw sample as returned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub value: f64,
    pub ts: DateTime<Utc>,
}

/// Ordered numeric samples with parallel timestamps. The unit of input to
/// every analysis; `values.len() == timestamps.len()` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl Series {
    pub fn new(values: Vec<f64>, timestamps: Vec<DateTime<Utc>>) -> crate::Result<Self> {
        if values.len() != timestamps.len() {
            return Err(crate::InsightError::InvalidParameter(format!(
                "series length mismatch: {} values vs {} timestamps",
                values.len(),
                timestamps.len()
            )));
        }
        Ok(Self { values, timestamps })
    }

    pub fn from_samples(samples: &[SamplePoint]) -> Self {
        Self {
            values: samples.iter().map(|s| s.value).collect(),
            timestamps: samples.iter().map(|s| s.ts).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Truncates to the first `len` samples, keeping values and timestamps in
    /// lockstep. Used by multi-stream alignment.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
        self.timestamps.truncate(len);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Binary,
    Percentage,
    Continuous,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Binary => write!(f, "binary"),
            ValueType::Percentage => write!(f, "percentage"),
            ValueType::Continuous => write!(f, "continuous"),
        }
    }
}

/// A detected gap in a stream's sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Quality snapshot computed fresh on every fetch; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuality {
    pub score: f64,
    pub issues: Vec<String>,
    pub missing_points: usize,
    pub gaps: Vec<TimeGap>,
}

impl Default for DataQuality {
    fn default() -> Self {
        Self {
            score: 1.0,
            issues: Vec::new(),
            missing_points: 0,
            gaps: Vec::new(),
        }
    }
}

/// A fetched series plus its provenance. Immutable once returned; analytic
/// components read `series` and produce new result objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamContext {
    pub stream_id: String,
    pub sensor_type: String,
    pub unit: String,
    pub value_type: ValueType,
    pub declared_range: Option<(f64, f64)>,
    pub series: Series,
    pub count: usize,
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub quality: DataQuality,
}

/// Entry of the stream discovery listing. Carries the same value-type
/// inference used internally so callers never have to guess identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: String,
    pub sensor_type: String,
    pub unit: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Low,
    Medium,
    High,
}

impl Reliability {
    /// Deterministic tier from a method confidence and the input data quality.
    pub fn derive(confidence: f64, data_quality: f64) -> Self {
        if confidence >= 0.7 && data_quality >= 0.8 {
            Reliability::High
        } else if confidence < 0.4 || data_quality < 0.5 {
            Reliability::Low
        } else {
            Reliability::Medium
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMeta {
    pub data_quality: f64,
    pub confidence: f64,
    pub reliability: Reliability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub sample_size: usize,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub parameters: serde_json::Value,
}

/// Generic envelope returned by every externally exposed analysis. `result`
/// holds the method-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult<T> {
    pub id: uuid::Uuid,
    pub stream_ids: Vec<String>,
    pub sensor_type: String,
    pub unit: String,
    pub method: String,
    pub result: T,
    pub interpretation: String,
    pub quality: QualityMeta,
    pub context: AnalysisContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_length_mismatch_rejected() {
        let ts = vec![Utc::now()];
        let result = Series::new(vec![1.0, 2.0], ts);
        assert!(result.is_err());
    }

    #[test]
    fn test_series_truncate_keeps_lockstep() {
        let now = Utc::now();
        let mut series = Series::new(
            vec![1.0, 2.0, 3.0],
            vec![now, now + chrono::Duration::seconds(60), now + chrono::Duration::seconds(120)],
        )
        .unwrap();
        series.truncate(2);
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.timestamps.len(), 2);
    }

    #[test]
    fn test_reliability_tiers() {
        assert_eq!(Reliability::derive(0.9, 0.95), Reliability::High);
        assert_eq!(Reliability::derive(0.5, 0.7), Reliability::Medium);
        assert_eq!(Reliability::derive(0.2, 0.9), Reliability::Low);
        assert_eq!(Reliability::derive(0.9, 0.3), Reliability::Low);
    }
}
