//! The async entry point tying storage, quality, and the analytic
//! components together. Every public operation fetches fresh data, runs one
//! analysis, and wraps the payload in an `AnalysisResult` envelope.

use crate::access::{discover_streams, fetch_range, fetch_recent};
use crate::interpret;
use crate::storage::StreamStore;
use chrono::{DateTime, Utc};
use insight_analysis::correlation::{
    self, CascadeResult, CausalityResult, CorrelationMatrix, CorrelationResult,
    CrossCorrelationResult, SynchronizedEvent,
};
use insight_analysis::pattern::{
    self, FrequencyComponent, Peak, PeakOptions, PeakRegularity, RepeatingSequence, Spike,
    TemplateMatch,
};
use insight_analysis::timeseries::{
    self, AutocorrelationResult, ChangePoint, CyclicPattern, SeasonalDecomposition, TrendDirection,
    TrendResult,
};
use insight_anomaly::{
    adaptive_threshold_anomalies, ensemble_detection, iqr_anomalies, lof_anomalies,
    modified_z_score_anomalies, seasonal_anomalies, trend_deviation_anomalies, z_score_anomalies,
    Anomaly, DetectionMethod, EnsembleAnomaly, EnsembleConfig, SeasonalAnomalyReport, TrendAnomaly,
};
use insight_core::config::AnalysisSettings;
use insight_core::stats::{self, NormalityCheck};
use insight_core::{
    AnalysisContext, AnalysisResult, InsightError, QualityMeta, Reliability, Result, StreamContext,
    StreamInfo,
};
use insight_quality::health::{
    compare_quality_periods, monitor_stream_health, HealthReport, QualityComparison,
};
use insight_quality::{assess_quality, QualityOptions, QualityReport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Descriptive statistics payload for a single stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub entropy_bits: f64,
    pub normality: NormalityCheck,
}

/// Smoothed views of one series, all aligned with the input indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedSeries {
    pub window: usize,
    pub sma: Vec<f64>,
    pub ema: Vec<f64>,
    pub moving_std: Vec<f64>,
}

/// Peaks, valleys and their cadence in one report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReport {
    pub peaks: Vec<Peak>,
    pub valleys: Vec<Peak>,
    pub regularity: PeakRegularity,
}

pub struct StreamAnalyzer {
    store: Arc<dyn StreamStore>,
    settings: AnalysisSettings,
}

impl StreamAnalyzer {
    pub fn new(store: Arc<dyn StreamStore>, settings: AnalysisSettings) -> Self {
        Self { store, settings }
    }

    pub fn with_defaults(store: Arc<dyn StreamStore>) -> Self {
        Self::new(store, AnalysisSettings::default())
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    async fn context(&self, stream_id: &str, count: Option<usize>) -> Result<StreamContext> {
        let count = count.unwrap_or(self.settings.default_fetch_count);
        fetch_recent(self.store.as_ref(), stream_id, count).await
    }

    /// Fetches both streams concurrently and trims each to the most recent
    /// shared length.
    async fn pair(
        &self,
        first: &str,
        second: &str,
        count: Option<usize>,
    ) -> Result<(StreamContext, StreamContext)> {
        let count = count.unwrap_or(self.settings.default_fetch_count);
        let (mut a, mut b) = tokio::try_join!(
            fetch_recent(self.store.as_ref(), first, count),
            fetch_recent(self.store.as_ref(), second, count)
        )?;
        let mut pair = [&mut a, &mut b];
        align(&mut pair);
        Ok((a, b))
    }

    /// Fetches many streams concurrently. Streams that fail to load are
    /// logged and dropped; survivors are trimmed to the shortest length.
    pub async fn fetch_aligned(
        &self,
        stream_ids: &[String],
        count: Option<usize>,
    ) -> Result<Vec<StreamContext>> {
        let count = count.unwrap_or(self.settings.default_fetch_count);
        let mut handles = Vec::with_capacity(stream_ids.len());
        for stream_id in stream_ids {
            let store = Arc::clone(&self.store);
            let stream_id = stream_id.clone();
            handles.push(tokio::spawn(async move {
                let fetched = fetch_recent(store.as_ref(), &stream_id, count).await;
                (stream_id, fetched)
            }));
        }

        let mut contexts = Vec::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((_, Ok(ctx))) => contexts.push(ctx),
                Ok((stream_id, Err(err))) => {
                    warn!(stream_id, %err, "dropping stream from multi-stream analysis")
                }
                Err(err) => warn!(%err, "stream fetch task failed"),
            }
        }

        let mut refs: Vec<&mut StreamContext> = contexts.iter_mut().collect();
        align(&mut refs);
        Ok(contexts)
    }

    pub async fn discover(&self) -> Result<Vec<StreamInfo>> {
        discover_streams(self.store.as_ref()).await
    }

    pub async fn summary_statistics(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<StatsSummary>> {
        let ctx = self.context(stream_id, count).await?;
        let values = &ctx.series.values;
        let summary = StatsSummary {
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            variance: stats::variance(values),
            median: stats::median(values),
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            q1: stats::quantile(values, 0.25)?,
            q3: stats::quantile(values, 0.75)?,
            iqr: stats::iqr(values),
            skewness: stats::skewness(values),
            excess_kurtosis: stats::excess_kurtosis(values),
            entropy_bits: stats::shannon_entropy(values, self.settings.entropy_bins),
            normality: stats::check_normality(values),
        };
        let interpretation = format!(
            "mean {:.2} {unit}, std {:.2}, {}",
            summary.mean,
            summary.std_dev,
            if summary.normality.is_normal {
                "roughly normal distribution"
            } else {
                "markedly non-normal distribution"
            },
            unit = ctx.unit
        );
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "summary_statistics",
            summary,
            interpretation,
            confidence,
            json!({ "entropy_bins": self.settings.entropy_bins }),
        ))
    }

    pub async fn trend(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<TrendResult>> {
        let ctx = self.context(stream_id, count).await?;
        let result = timeseries::linear_trend(&ctx.series.values);
        let interpretation = interpret::trend(&result, &ctx.unit);
        let confidence = if result.direction == TrendDirection::Stable {
            interpret::sample_confidence(ctx.series.len())
        } else {
            result.r_squared
        };
        Ok(self.envelope(&ctx, "linear_trend", result, interpretation, confidence, json!({})))
    }

    pub async fn smoothed(
        &self,
        stream_id: &str,
        window: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<SmoothedSeries>> {
        let ctx = self.context(stream_id, count).await?;
        let values = &ctx.series.values;
        let result = SmoothedSeries {
            window,
            sma: timeseries::simple_moving_average(values, window)?,
            ema: timeseries::exponential_moving_average(values, window)?,
            moving_std: timeseries::moving_std(values, window)?,
        };
        let interpretation = format!("smoothed over a {window}-sample window");
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "smoothing",
            result,
            interpretation,
            confidence,
            json!({ "window": window }),
        ))
    }

    pub async fn change_points(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<ChangePoint>>> {
        let ctx = self.context(stream_id, count).await?;
        let result =
            timeseries::detect_change_points(&ctx.series.values, self.settings.change_point_threshold);
        let interpretation = interpret::change_points(&result);
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "change_points",
            result,
            interpretation,
            confidence,
            json!({ "threshold": self.settings.change_point_threshold }),
        ))
    }

    pub async fn autocorrelation_profile(
        &self,
        stream_id: &str,
        max_lag: Option<usize>,
        count: Option<usize>,
    ) -> Result<AnalysisResult<AutocorrelationResult>> {
        let ctx = self.context(stream_id, count).await?;
        let result = timeseries::autocorrelation(&ctx.series.values, max_lag);
        let interpretation = if result.is_persistent {
            format!(
                "strongly persistent series with {} significant lags",
                result.significant_lags.len()
            )
        } else {
            format!("{} significant lags", result.significant_lags.len())
        };
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "autocorrelation",
            result,
            interpretation,
            confidence,
            json!({ "max_lag": max_lag }),
        ))
    }

    pub async fn cyclic_patterns(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<CyclicPattern>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = timeseries::detect_cyclic_patterns(&ctx.series.values, None);
        let interpretation = match result.first() {
            Some(best) => format!(
                "{} candidate cycles, dominant period {} samples (strength {:.2})",
                result.len(),
                best.period,
                best.strength
            ),
            None => "no cyclic behavior detected".to_string(),
        };
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(&ctx, "cyclic_patterns", result, interpretation, confidence, json!({})))
    }

    pub async fn seasonal_decomposition(
        &self,
        stream_id: &str,
        period: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<SeasonalDecomposition>> {
        let ctx = self.context(stream_id, count).await?;
        let n = ctx.series.len();
        let result = timeseries::seasonal_decompose(&ctx.series.values, period)?;
        let degraded = n < 2 * period;
        let interpretation = if degraded {
            format!("series too short for a period of {period}; returning the raw series as trend")
        } else {
            format!("decomposed against a period of {period} samples")
        };
        let confidence = if degraded {
            0.2
        } else {
            interpret::sample_confidence(n)
        };
        Ok(self.envelope(
            &ctx,
            "seasonal_decomposition",
            result,
            interpretation,
            confidence,
            json!({ "period": period }),
        ))
    }

    pub async fn peaks(
        &self,
        stream_id: &str,
        options: PeakOptions,
        count: Option<usize>,
    ) -> Result<AnalysisResult<PatternReport>> {
        let ctx = self.context(stream_id, count).await?;
        let values = &ctx.series.values;
        let result = PatternReport {
            peaks: pattern::find_peaks(values, &options),
            valleys: pattern::find_valleys(values, &options),
            regularity: pattern::peak_regularity(values, &options),
        };
        let interpretation = format!(
            "{} peaks and {} valleys{}",
            result.peaks.len(),
            result.valleys.len(),
            if result.regularity.is_regular {
                ", regular cadence"
            } else {
                ""
            }
        );
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "peak_detection",
            result,
            interpretation,
            confidence,
            json!({ "min_distance": options.min_distance }),
        ))
    }

    pub async fn spikes(
        &self,
        stream_id: &str,
        threshold: Option<f64>,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<Spike>>> {
        let ctx = self.context(stream_id, count).await?;
        let threshold = threshold.unwrap_or(self.settings.z_score_threshold);
        let result = pattern::detect_spikes(&ctx.series.values, threshold);
        let interpretation = if result.is_empty() {
            "no spikes detected".to_string()
        } else {
            format!("{} spikes beyond {threshold:.1} standard deviations", result.len())
        };
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "spike_detection",
            result,
            interpretation,
            confidence,
            json!({ "threshold": threshold }),
        ))
    }

    pub async fn template_search(
        &self,
        stream_id: &str,
        template: &[f64],
        min_similarity: f64,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<TemplateMatch>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = pattern::match_template(&ctx.series.values, template, min_similarity)?;
        let interpretation = match result.first() {
            Some(best) => format!(
                "{} windows matched, best similarity {:.2}",
                result.len(),
                best.similarity
            ),
            None => "no matching windows".to_string(),
        };
        let confidence = result.first().map(|m| m.similarity).unwrap_or(0.5);
        Ok(self.envelope(
            &ctx,
            "template_match",
            result,
            interpretation,
            confidence,
            json!({ "template_len": template.len(), "min_similarity": min_similarity }),
        ))
    }

    pub async fn repeating_sequences(
        &self,
        stream_id: &str,
        min_length: usize,
        max_length: usize,
        min_occurrences: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<RepeatingSequence>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = pattern::find_repeating_sequences(
            &ctx.series.values,
            min_length,
            max_length,
            min_occurrences,
        )?;
        let interpretation = match result.first() {
            Some(best) => format!(
                "{} recurring motifs, most frequent repeats {} times",
                result.len(),
                best.occurrences.len()
            ),
            None => "no recurring motifs".to_string(),
        };
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "repeating_sequences",
            result,
            interpretation,
            confidence,
            json!({ "min_length": min_length, "max_length": max_length }),
        ))
    }

    pub async fn dominant_frequencies(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<FrequencyComponent>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = pattern::dominant_frequencies(&ctx.series.values, None);
        let interpretation = match result.first() {
            Some(best) => format!("dominant period of {} samples", best.period),
            None => "no dominant periodicity".to_string(),
        };
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "dominant_frequencies",
            result,
            interpretation,
            confidence,
            json!({}),
        ))
    }

    /// One of the four index-based detectors, using configured thresholds.
    pub async fn anomalies(
        &self,
        stream_id: &str,
        method: DetectionMethod,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<Anomaly>>> {
        let ctx = self.context(stream_id, count).await?;
        let values = &ctx.series.values;
        let result = match method {
            DetectionMethod::ZScore => z_score_anomalies(values, self.settings.z_score_threshold),
            DetectionMethod::ModifiedZScore => {
                modified_z_score_anomalies(values, self.settings.modified_z_threshold)
            }
            DetectionMethod::Iqr => iqr_anomalies(values, self.settings.iqr_multiplier),
            DetectionMethod::Lof => {
                lof_anomalies(values, self.settings.lof_neighbors, self.settings.lof_threshold)
            }
            other => {
                return Err(InsightError::InvalidParameter(format!(
                    "method '{other}' has its own entry point"
                )))
            }
        };
        let interpretation = interpret::anomalies(&result, values.len());
        let confidences: Vec<f64> = result.iter().map(|a| a.confidence).collect();
        let confidence = interpret::anomaly_confidence(&confidences, values.len());
        Ok(self.envelope(
            &ctx,
            &method.to_string(),
            result,
            interpretation,
            confidence,
            json!({ "method": method.to_string() }),
        ))
    }

    pub async fn seasonal_anomalies(
        &self,
        stream_id: &str,
        period: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<SeasonalAnomalyReport>> {
        let ctx = self.context(stream_id, count).await?;
        let result =
            seasonal_anomalies(&ctx.series.values, period, self.settings.z_score_threshold)?;
        let interpretation = interpret::anomalies(&result.anomalies, ctx.series.len());
        let confidences: Vec<f64> = result.anomalies.iter().map(|a| a.confidence).collect();
        let confidence = interpret::anomaly_confidence(&confidences, ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "seasonal_anomalies",
            result,
            interpretation,
            confidence,
            json!({ "period": period }),
        ))
    }

    pub async fn trend_anomalies(
        &self,
        stream_id: &str,
        window: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<TrendAnomaly>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = trend_deviation_anomalies(
            &ctx.series.values,
            window,
            self.settings.z_score_threshold,
        )?;
        let interpretation = if result.is_empty() {
            format!("no trend deviations in {} samples", ctx.series.len())
        } else {
            format!("{} departures from the local trend", result.len())
        };
        let confidences: Vec<f64> = result.iter().map(|a| a.confidence).collect();
        let confidence = interpret::anomaly_confidence(&confidences, ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "trend_deviation",
            result,
            interpretation,
            confidence,
            json!({ "window": window }),
        ))
    }

    pub async fn adaptive_anomalies(
        &self,
        stream_id: &str,
        window: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<Anomaly>>> {
        let ctx = self.context(stream_id, count).await?;
        let result = adaptive_threshold_anomalies(
            &ctx.series.values,
            window,
            self.settings.z_score_threshold,
        )?;
        let interpretation = interpret::anomalies(&result, ctx.series.len());
        let confidences: Vec<f64> = result.iter().map(|a| a.confidence).collect();
        let confidence = interpret::anomaly_confidence(&confidences, ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "adaptive_threshold",
            result,
            interpretation,
            confidence,
            json!({ "window": window }),
        ))
    }

    pub async fn ensemble(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<EnsembleAnomaly>>> {
        let ctx = self.context(stream_id, count).await?;
        let config = EnsembleConfig {
            consensus_threshold: self.settings.consensus_threshold,
            z_score_threshold: self.settings.z_score_threshold,
            modified_z_threshold: self.settings.modified_z_threshold,
            iqr_multiplier: self.settings.iqr_multiplier,
            lof_neighbors: self.settings.lof_neighbors,
            lof_threshold: self.settings.lof_threshold,
            ..EnsembleConfig::default()
        };
        let methods = config.methods.len();
        let result = ensemble_detection(&ctx.series.values, &config);
        let interpretation = interpret::ensemble(&result, ctx.series.len(), methods);
        let confidences: Vec<f64> = result.iter().map(|a| a.confidence).collect();
        let confidence = interpret::anomaly_confidence(&confidences, ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "ensemble",
            result,
            interpretation,
            confidence,
            json!({ "consensus_threshold": config.consensus_threshold, "methods": methods }),
        ))
    }

    pub async fn quality(
        &self,
        stream_id: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<QualityReport>> {
        let ctx = self.context(stream_id, count).await?;
        let result = assess_quality(
            &ctx.series.values,
            &ctx.series.timestamps,
            &quality_options(&ctx),
        );
        let interpretation = format!(
            "grade {} ({:.0}% overall), {} issues",
            result.grade,
            result.overall_score * 100.0,
            result.issues.len()
        );
        Ok(self.envelope(&ctx, "quality_assessment", result, interpretation, 0.9, json!({})))
    }

    pub async fn health(
        &self,
        stream_id: &str,
        window_size: usize,
        step: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<HealthReport>> {
        let ctx = self.context(stream_id, count).await?;
        let result = monitor_stream_health(
            &ctx.series.values,
            &ctx.series.timestamps,
            window_size,
            step,
            &quality_options(&ctx),
        )?;
        let interpretation = format!(
            "quality {:?} across {} windows, latest score {:.2}",
            result.trend,
            result.windows.len(),
            result.latest_score
        );
        let confidence = interpret::sample_confidence(ctx.series.len());
        Ok(self.envelope(
            &ctx,
            "health_monitoring",
            result,
            interpretation,
            confidence,
            json!({ "window_size": window_size, "step": step }),
        ))
    }

    pub async fn compare_quality(
        &self,
        stream_id: &str,
        current: (DateTime<Utc>, DateTime<Utc>),
        baseline: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<AnalysisResult<QualityComparison>> {
        let (current_ctx, baseline_ctx) = tokio::try_join!(
            fetch_range(self.store.as_ref(), stream_id, current.0, current.1),
            fetch_range(self.store.as_ref(), stream_id, baseline.0, baseline.1)
        )?;
        let result = compare_quality_periods(
            &current_ctx.series.values,
            &current_ctx.series.timestamps,
            &baseline_ctx.series.values,
            &baseline_ctx.series.timestamps,
            &quality_options(&current_ctx),
        );
        let interpretation = if result.score_delta.abs() < 0.01 {
            "quality unchanged between periods".to_string()
        } else if result.score_delta > 0.0 {
            format!("quality improved by {:.0}%", result.score_delta * 100.0)
        } else {
            format!("quality declined by {:.0}%", -result.score_delta * 100.0)
        };
        Ok(self.envelope(
            &current_ctx,
            "quality_comparison",
            result,
            interpretation,
            0.9,
            json!({
                "current": [current.0, current.1],
                "baseline": [baseline.0, baseline.1],
            }),
        ))
    }

    pub async fn correlate(
        &self,
        first: &str,
        second: &str,
        count: Option<usize>,
    ) -> Result<AnalysisResult<CorrelationResult>> {
        let (a, b) = self.pair(first, second, count).await?;
        let result = correlation::correlate(&a.series.values, &b.series.values);
        let interpretation = interpret::correlation(&result, first, second);
        let confidence = result.correlation.abs();
        Ok(self.multi_envelope(
            &[&a, &b],
            "pearson_correlation",
            result,
            interpretation,
            confidence,
            json!({}),
        ))
    }

    pub async fn cross_correlate(
        &self,
        first: &str,
        second: &str,
        max_lag: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<CrossCorrelationResult>> {
        let (a, b) = self.pair(first, second, count).await?;
        let result = correlation::cross_correlation(&a.series.values, &b.series.values, max_lag);
        let interpretation = interpret::cross_correlation(&result, first, second);
        let confidence = result.best_correlation.abs();
        Ok(self.multi_envelope(
            &[&a, &b],
            "cross_correlation",
            result,
            interpretation,
            confidence,
            json!({ "max_lag": max_lag }),
        ))
    }

    pub async fn causality(
        &self,
        first: &str,
        second: &str,
        max_lag: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<CausalityResult>> {
        let (a, b) = self.pair(first, second, count).await?;
        let result =
            correlation::causality_approximation(&a.series.values, &b.series.values, max_lag);
        let interpretation = interpret::causality(&result, first, second);
        let best = result.improvement_x_to_y.max(result.improvement_y_to_x);
        let confidence = match result.direction {
            correlation::CausalDirection::NoCausality => 0.5,
            _ => (best * 2.0).min(1.0),
        };
        Ok(self.multi_envelope(
            &[&a, &b],
            "causality_approximation",
            result,
            interpretation,
            confidence,
            json!({ "max_lag": max_lag }),
        ))
    }

    pub async fn correlation_matrix(
        &self,
        stream_ids: &[String],
        significance: f64,
        count: Option<usize>,
    ) -> Result<AnalysisResult<CorrelationMatrix>> {
        let contexts = self.fetch_aligned(stream_ids, count).await?;
        let named = named_series(&contexts);
        require_multi(&named)?;
        let result = correlation::correlation_matrix(&named, significance);
        let interpretation = interpret::matrix(&result);
        let refs: Vec<&StreamContext> = contexts.iter().collect();
        let n = contexts.first().map(|c| c.series.len()).unwrap_or(0);
        let confidence = interpret::sample_confidence(n);
        Ok(self.multi_envelope(
            &refs,
            "correlation_matrix",
            result,
            interpretation,
            confidence,
            json!({ "significance": significance }),
        ))
    }

    pub async fn synchronized_events(
        &self,
        stream_ids: &[String],
        time_window: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<SynchronizedEvent>>> {
        let contexts = self.fetch_aligned(stream_ids, count).await?;
        let named = named_series(&contexts);
        require_multi(&named)?;
        let result =
            correlation::synchronized_events(&named, self.settings.sync_event_threshold, time_window);
        let interpretation = if result.is_empty() {
            "no synchronized excursions".to_string()
        } else {
            format!("{} synchronized excursions across the group", result.len())
        };
        let refs: Vec<&StreamContext> = contexts.iter().collect();
        let n = contexts.first().map(|c| c.series.len()).unwrap_or(0);
        let confidence = interpret::sample_confidence(n);
        Ok(self.multi_envelope(
            &refs,
            "synchronized_events",
            result,
            interpretation,
            confidence,
            json!({ "threshold": self.settings.sync_event_threshold, "time_window": time_window }),
        ))
    }

    pub async fn cascading_failures(
        &self,
        stream_ids: &[String],
        max_delay: usize,
        count: Option<usize>,
    ) -> Result<AnalysisResult<Vec<CascadeResult>>> {
        let contexts = self.fetch_aligned(stream_ids, count).await?;
        let named = named_series(&contexts);
        require_multi(&named)?;
        let result = correlation::cascading_failures(&named, max_delay);
        let interpretation = match result.first() {
            Some(top) => format!(
                "{} cascade candidates, {} leads {} followers (strength {:.2})",
                result.len(),
                top.initiator,
                top.followers.len(),
                top.strength
            ),
            None => "no cascade structure detected".to_string(),
        };
        let confidence = result.first().map(|c| c.strength).unwrap_or_else(|| {
            interpret::sample_confidence(contexts.first().map(|c| c.series.len()).unwrap_or(0))
        });
        let refs: Vec<&StreamContext> = contexts.iter().collect();
        Ok(self.multi_envelope(
            &refs,
            "cascading_failures",
            result,
            interpretation,
            confidence,
            json!({ "max_delay": max_delay }),
        ))
    }

    fn envelope<T>(
        &self,
        ctx: &StreamContext,
        method: &str,
        result: T,
        interpretation: String,
        confidence: f64,
        parameters: serde_json::Value,
    ) -> AnalysisResult<T> {
        self.build(
            vec![ctx.stream_id.clone()],
            ctx.sensor_type.clone(),
            ctx.unit.clone(),
            ctx.quality.score,
            ctx.series.len(),
            time_range(ctx),
            method,
            result,
            interpretation,
            confidence,
            parameters,
        )
    }

    fn multi_envelope<T>(
        &self,
        contexts: &[&StreamContext],
        method: &str,
        result: T,
        interpretation: String,
        confidence: f64,
        parameters: serde_json::Value,
    ) -> AnalysisResult<T> {
        let stream_ids: Vec<String> = contexts.iter().map(|c| c.stream_id.clone()).collect();
        let first = contexts.first();
        let uniform = |get: fn(&StreamContext) -> &String| -> String {
            match first {
                Some(head) if contexts.iter().all(|c| get(c) == get(head)) => get(head).clone(),
                Some(_) => "mixed".to_string(),
                None => String::new(),
            }
        };
        let data_quality = contexts
            .iter()
            .map(|c| c.quality.score)
            .fold(1.0f64, f64::min);
        let sample_size = contexts.iter().map(|c| c.series.len()).min().unwrap_or(0);
        let range = first.and_then(|c| time_range(c));
        self.build(
            stream_ids,
            uniform(|c| &c.sensor_type),
            uniform(|c| &c.unit),
            data_quality,
            sample_size,
            range,
            method,
            result,
            interpretation,
            confidence,
            parameters,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build<T>(
        &self,
        stream_ids: Vec<String>,
        sensor_type: String,
        unit: String,
        data_quality: f64,
        sample_size: usize,
        time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        method: &str,
        result: T,
        interpretation: String,
        confidence: f64,
        parameters: serde_json::Value,
    ) -> AnalysisResult<T> {
        info!(method, streams = ?stream_ids, sample_size, confidence, "analysis complete");
        AnalysisResult {
            id: Uuid::new_v4(),
            stream_ids,
            sensor_type,
            unit,
            method: method.to_string(),
            result,
            interpretation,
            quality: QualityMeta {
                data_quality,
                confidence,
                reliability: Reliability::derive(confidence, data_quality),
            },
            context: AnalysisContext {
                sample_size,
                time_range,
                parameters,
            },
        }
    }
}

/// Trims every context to the most recent shared length so indices line up
/// across streams.
fn align(contexts: &mut [&mut StreamContext]) {
    let min = contexts.iter().map(|c| c.series.len()).min().unwrap_or(0);
    for ctx in contexts.iter_mut() {
        let excess = ctx.series.len() - min;
        if excess > 0 {
            ctx.series.values.drain(..excess);
            ctx.series.timestamps.drain(..excess);
        }
    }
}

fn named_series(contexts: &[StreamContext]) -> Vec<(String, Vec<f64>)> {
    contexts
        .iter()
        .map(|c| (c.stream_id.clone(), c.series.values.clone()))
        .collect()
}

fn require_multi(named: &[(String, Vec<f64>)]) -> Result<()> {
    if named.len() < 2 {
        return Err(InsightError::InvalidParameter(
            "multi-stream analysis needs at least two loadable streams".to_string(),
        ));
    }
    Ok(())
}

fn quality_options(ctx: &StreamContext) -> QualityOptions {
    QualityOptions {
        expected_interval_secs: None,
        expected_range: ctx.declared_range,
    }
}

fn time_range(ctx: &StreamContext) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match (ctx.series.timestamps.first(), ctx.series.timestamps.last()) {
        (Some(&first), Some(&last)) => Some((first, last)),
        _ => None,
    }
}
