//! Pure numerical analyses over time-ordered series: trend fitting and
//! change-point detection, pattern discovery, and cross-stream correlation
//! and causality approximation. Every function here is synchronous and
//! stateless; inputs are borrowed slices and outputs are freshly allocated
//! result values.

pub mod correlation;
pub mod pattern;
pub mod timeseries;
