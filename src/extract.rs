// m4b2oga - M4B Audiobook to OGA Converter
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Extraction driver
//!
//! Runs one input through the whole pipeline:
//! 1. Validate the input and derive its base name
//! 2. Ensure the output directory exists
//! 3. Read chapters, cover and tags from the container
//! 4. Resolve where each output goes
//! 5. Write cue, cover and info (only those with source data)
//! 6. Encode the OGA unless a previous run already produced it
//!
//! Sidecars are written before encoding starts. A failed encode leaves them in
//! place; re-running resumes through the skip/suffix policy.

use crate::audio::converter::{AudioConverter, Transcoder};
use crate::audio::decoder::FfprobeReader;
use crate::audio::metadata::{ContainerMetadata, CueSheet, MetadataReader};
use crate::config::Settings;
use crate::error::{ConvertError, Result};
use crate::file::manager::FileManager;
use crate::file::paths::{self, OutputKind};
use crate::file::resolver::{CollisionResolver, Decision, DiskExistence, ExistenceCheck, OutputPlan};
use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Written at this path
    Written(PathBuf),
    /// Not produced because the resolver said so
    Skipped,
    /// The input carries no data for this output
    Unavailable,
    /// The decided path was already occupied; left untouched
    AlreadyPresent(PathBuf),
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStatus::Written(path) => write!(f, "written to {}", path.display()),
            ArtifactStatus::Skipped => f.write_str("skipped (already converted)"),
            ArtifactStatus::Unavailable => f.write_str("not present in input"),
            ArtifactStatus::AlreadyPresent(path) => {
                write!(f, "kept existing {}", path.display())
            }
        }
    }
}

/// Decision and result for one output kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOutcome {
    pub kind: OutputKind,
    pub decision: Decision,
    pub status: ArtifactStatus,
}

/// Result of processing one input file
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub input: PathBuf,
    pub base_name: String,
    pub output_dir: PathBuf,
    pub outcomes: Vec<ArtifactOutcome>,
}

impl ExtractionReport {
    pub fn outcome(&self, kind: OutputKind) -> Option<&ArtifactOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    /// Paths written during this run
    pub fn written(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                ArtifactStatus::Written(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    /// Whether the encoder ran
    pub fn transcoded(&self) -> bool {
        matches!(
            self.outcome(OutputKind::Audio).map(|o| &o.status),
            Some(ArtifactStatus::Written(_))
        )
    }
}

/// Outcome of a run over several inputs
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<ExtractionReport>,
    pub failures: Vec<(PathBuf, ConvertError)>,
}

impl BatchSummary {
    /// No input failed. A run where every output was skipped still succeeds.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.reports.len() + self.failures.len()
    }
}

/// Extraction driver
pub struct Extractor<R, T, F = DiskExistence>
where
    R: MetadataReader,
    T: Transcoder,
    F: ExistenceCheck,
{
    reader: R,
    transcoder: T,
    resolver: CollisionResolver<F>,
    output_dir: Option<PathBuf>,
}

impl Extractor<FfprobeReader, AudioConverter, DiskExistence> {
    /// FFmpeg-backed driver on the real filesystem
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            FfprobeReader::new(settings.tools.clone()),
            AudioConverter::new(settings.encoder.clone(), settings.tools.clone()),
            CollisionResolver::on_disk(),
        )
        .with_output_dir(settings.output_dir.clone())
    }
}

impl<R, T, F> Extractor<R, T, F>
where
    R: MetadataReader,
    T: Transcoder,
    F: ExistenceCheck,
{
    pub fn new(reader: R, transcoder: T, resolver: CollisionResolver<F>) -> Self {
        Self {
            reader,
            transcoder,
            resolver,
            output_dir: None,
        }
    }

    /// Write outputs here instead of next to each input
    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Process one input file start to finish
    pub async fn process(&self, input: &Path) -> Result<ExtractionReport> {
        Self::validate_input(input).await?;

        let base_name = paths::base_name(input)?;
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| paths::default_output_dir(input));

        let manager = FileManager::new(output_dir.clone());
        manager.ensure_output_dir().await?;

        log::info!(
            "Processing {} (base name '{}', output {})",
            input.display(),
            base_name,
            output_dir.display()
        );

        let metadata = self.reader.read_metadata(input).await?;
        let plan = self.resolver.resolve_all(&base_name, &output_dir)?;

        let mut outcomes = Vec::with_capacity(OutputKind::ALL.len());
        for kind in OutputKind::ALL.into_iter().filter(OutputKind::is_metadata) {
            let content = Self::sidecar_content(kind, &metadata, &base_name);
            let outcome = Self::write_sidecar(&manager, &plan, kind, content).await?;
            outcomes.push(outcome);
        }

        outcomes.push(self.encode(input, &plan).await?);

        Ok(ExtractionReport {
            input: input.to_path_buf(),
            base_name,
            output_dir,
            outcomes,
        })
    }

    /// Process inputs one after another
    ///
    /// A failing input is recorded and the run moves on to the next one.
    /// `on_result` sees each result as soon as it is available.
    pub async fn process_all<P, C>(&self, inputs: &[P], mut on_result: C) -> BatchSummary
    where
        P: AsRef<Path>,
        C: FnMut(&Path, &Result<ExtractionReport>),
    {
        let mut summary = BatchSummary::default();

        for input in inputs {
            let input = input.as_ref();
            let result = self.process(input).await;
            on_result(input, &result);

            match result {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    log::debug!("{} failed: {:?}", input.display(), e);
                    summary.failures.push((input.to_path_buf(), e));
                }
            }
        }

        summary
    }

    async fn validate_input(input: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(input)
            .await
            .map_err(|e| ConvertError::input_not_found(format!("{}: {}", input.display(), e)))?;

        if !meta.is_file() {
            return Err(ConvertError::input_not_found(format!(
                "{}: not a regular file",
                input.display()
            )));
        }
        Ok(())
    }

    /// Bytes for a sidecar, `None` when the input has nothing to put in it
    fn sidecar_content(kind: OutputKind, metadata: &ContainerMetadata, base_name: &str) -> Option<Vec<u8>> {
        match kind {
            OutputKind::Audio => None,
            OutputKind::Cue => {
                if metadata.chapters.is_empty() {
                    return None;
                }
                let info = metadata.book_info(base_name);
                let audio_filename = OutputKind::Audio.default_filename(base_name);
                Some(CueSheet::generate(&info, &metadata.chapters, &audio_filename).into_bytes())
            }
            OutputKind::Cover => metadata.cover.clone().filter(|bytes| !bytes.is_empty()),
            OutputKind::Info => metadata
                .book_info(base_name)
                .render_info_text()
                .map(String::into_bytes),
        }
    }

    async fn write_sidecar(
        manager: &FileManager,
        plan: &OutputPlan,
        kind: OutputKind,
        content: Option<Vec<u8>>,
    ) -> Result<ArtifactOutcome> {
        let decision = plan.decision(kind).clone();

        let status = match (content, plan.target(kind)) {
            (None, _) => {
                log::info!("No {} data in input, nothing to write", kind);
                ArtifactStatus::Unavailable
            }
            (Some(_), None) => ArtifactStatus::Skipped,
            (Some(bytes), Some(target)) => match manager.write_new(&target, &bytes).await {
                Ok(()) => {
                    log::info!("Wrote {} to {}", kind, target.display());
                    ArtifactStatus::Written(target)
                }
                Err(ConvertError::FileAlreadyExists(_)) => {
                    log::warn!(
                        "{} already exists, leaving it untouched",
                        target.display()
                    );
                    ArtifactStatus::AlreadyPresent(target)
                }
                Err(e) => return Err(e),
            },
        };

        Ok(ArtifactOutcome {
            kind,
            decision,
            status,
        })
    }

    async fn encode(&self, input: &Path, plan: &OutputPlan) -> Result<ArtifactOutcome> {
        let kind = OutputKind::Audio;
        let decision = plan.decision(kind).clone();

        let status = match plan.target(kind) {
            None => {
                log::info!(
                    "{} already exists, skipping encode",
                    kind.primary_path(&plan.base_name, &plan.output_dir).display()
                );
                ArtifactStatus::Skipped
            }
            Some(target) => {
                self.transcoder.transcode(input, &target).await?;
                log::info!("Encoded {}", target.display());
                ArtifactStatus::Written(target)
            }
        };

        Ok(ArtifactOutcome {
            kind,
            decision,
            status,
        })
    }
}
