pub mod config;
pub mod stats;
pub mod types;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("no data found for stream '{stream_id}'")]
    NotFound { stream_id: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, InsightError>;

pub use types::{
    AnalysisContext, AnalysisResult, DataQuality, QualityMeta, Reliability, SamplePoint, Series,
    StreamContext, StreamInfo, TimeGap, ValueType,
};
