//! m4b2oga: convert M4B audiobooks to Ogg audio (OGA) with sidecar files
//!
//! For each input `<base>.m4b` the converter produces up to four outputs in the
//! output directory: `<base>.oga`, `<base>.cue`, `cover.jpg` and `info.txt`.
//! Existing files are never overwritten; see [`file::resolver`] for the policy.

pub mod audio;
pub mod config;
pub mod error;
pub mod extract;
pub mod file;

pub use config::{ConfigOverrides, Settings, ToolPaths};
pub use error::{ConvertError, Result};
pub use extract::{ArtifactOutcome, ArtifactStatus, BatchSummary, ExtractionReport, Extractor};
pub use file::{CollisionResolver, Decision, OutputKind, OutputPlan};

/// Convert one input with FFmpeg-backed components
pub async fn convert_file(input: &std::path::Path, settings: &Settings) -> Result<ExtractionReport> {
    Extractor::from_settings(settings).process(input).await
}
