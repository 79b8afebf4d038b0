//! Fetching streams into analysis-ready contexts, including value-type
//! inference from the stream identifier and an inline quality snapshot.

use crate::storage::StreamStore;
use chrono::{DateTime, Utc};
use insight_core::{Result, Series, StreamContext, StreamInfo, ValueType};
use insight_quality::QualityOptions;
use tracing::debug;

/// Everything inferable from a stream identifier alone.
#[derive(Debug, Clone)]
pub struct StreamKind {
    pub sensor_type: String,
    pub unit: String,
    pub value_type: ValueType,
    pub declared_range: Option<(f64, f64)>,
}

/// Substring heuristics over the lowercased identifier. Order matters:
/// binary states win over actuator outputs, which win over temperatures.
pub fn infer_kind(stream_id: &str) -> StreamKind {
    let id = stream_id.to_lowercase();
    if id.contains("occup") || id.contains("fan") {
        StreamKind {
            sensor_type: "binary state".to_string(),
            unit: String::new(),
            value_type: ValueType::Binary,
            declared_range: Some((0.0, 1.0)),
        }
    } else if id.contains("output") || id.contains("valve") || id.contains("heat") || id.contains("cool")
    {
        StreamKind {
            sensor_type: "actuator output".to_string(),
            unit: "%".to_string(),
            value_type: ValueType::Percentage,
            declared_range: Some((0.0, 100.0)),
        }
    } else if id.contains("temp") || id.contains("setpt") {
        StreamKind {
            sensor_type: "temperature".to_string(),
            unit: "°C".to_string(),
            value_type: ValueType::Continuous,
            declared_range: Some((-20.0, 60.0)),
        }
    } else {
        StreamKind {
            sensor_type: "measurement".to_string(),
            unit: String::new(),
            value_type: ValueType::Continuous,
            declared_range: None,
        }
    }
}

/// Latest `count` samples as a chronological context.
pub async fn fetch_recent(
    store: &dyn StreamStore,
    stream_id: &str,
    count: usize,
) -> Result<StreamContext> {
    let mut samples = store.recent(stream_id, count).await?;
    // Storage hands back newest first; analyses run oldest first.
    samples.reverse();
    build_context(stream_id, Series::from_samples(&samples), count, None)
}

/// All samples in a time window as a chronological context.
pub async fn fetch_range(
    store: &dyn StreamStore,
    stream_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<StreamContext> {
    let samples = store.range(stream_id, start, end).await?;
    let count = samples.len();
    build_context(
        stream_id,
        Series::from_samples(&samples),
        count,
        Some((start, end)),
    )
}

/// Discovery listing with inferred metadata per stream.
pub async fn discover_streams(store: &dyn StreamStore) -> Result<Vec<StreamInfo>> {
    let ids = store.list_streams().await?;
    Ok(ids
        .into_iter()
        .map(|stream_id| {
            let kind = infer_kind(&stream_id);
            StreamInfo {
                stream_id,
                sensor_type: kind.sensor_type,
                unit: kind.unit,
                value_type: kind.value_type,
            }
        })
        .collect())
}

fn build_context(
    stream_id: &str,
    series: Series,
    count: usize,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<StreamContext> {
    let kind = infer_kind(stream_id);
    let quality = insight_quality::snapshot(
        &series.values,
        &series.timestamps,
        &QualityOptions {
            expected_interval_secs: None,
            expected_range: kind.declared_range,
        },
    );

    debug!(
        stream_id,
        samples = series.len(),
        quality = quality.score,
        "stream context built"
    );

    Ok(StreamContext {
        stream_id: stream_id.to_string(),
        sensor_type: kind.sensor_type,
        unit: kind.unit,
        value_type: kind.value_type,
        declared_range: kind.declared_range,
        series,
        count,
        window,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_inference_wins_over_temperature() {
        let kind = infer_kind("zone3.fan_heat_status");
        assert_eq!(kind.value_type, ValueType::Binary);
        assert_eq!(kind.declared_range, Some((0.0, 1.0)));
    }

    #[test]
    fn test_percentage_inference() {
        let kind = infer_kind("fcu12.cool_valve_output");
        assert_eq!(kind.value_type, ValueType::Percentage);
        assert_eq!(kind.unit, "%");
        assert_eq!(kind.declared_range, Some((0.0, 100.0)));
    }

    #[test]
    fn test_temperature_inference() {
        let kind = infer_kind("zone1.room_temp");
        assert_eq!(kind.value_type, ValueType::Continuous);
        assert_eq!(kind.unit, "°C");
        assert_eq!(kind.declared_range, Some((-20.0, 60.0)));

        let setpoint = infer_kind("zone1.setpt");
        assert_eq!(setpoint.unit, "°C");
    }

    #[test]
    fn test_unknown_identifier_is_unranged_continuous() {
        let kind = infer_kind("meter7.power");
        assert_eq!(kind.value_type, ValueType::Continuous);
        assert_eq!(kind.declared_range, None);
        assert!(kind.unit.is_empty());
    }
}
