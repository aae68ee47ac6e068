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


//! Container inspection through FFprobe
//!
//! # Strategy
//! 1. Sniff the file header (magic bytes) to warn early about non-MP4 input
//! 2. One FFprobe call: `-show_format -show_streams -show_chapters`
//! 3. If a picture stream is present, one FFmpeg call piping that stream to
//!    stdout as JPEG
//!
//! An FFprobe failure means the input is not a readable container. A failed
//! cover extraction only loses the cover.

use crate::audio::metadata::{BookTags, Chapter, ContainerMetadata, MetadataReader};
use crate::config::ToolPaths;
use crate::error::{ConvertError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Output;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Container family detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 family (M4B, M4A)
    Mp4,
    /// Ogg (already converted)
    Ogg,
    Unknown,
}

impl ContainerFormat {
    /// Detect container from byte header
    ///
    /// Magic bytes:
    /// - MP4: "ftyp" at bytes 4-7 (after 4-byte size field)
    /// - Ogg: "OggS" at bytes 0-3
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            return Self::Mp4;
        }
        if bytes.len() >= 4 && &bytes[0..4] == b"OggS" {
            return Self::Ogg;
        }
        Self::Unknown
    }

    /// Detect container from the first bytes of a file
    pub async fn sniff(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .await
            .map_err(|e| ConvertError::input_not_found(format!("{}: {}", path.display(), e)))?;

        let mut header = [0u8; 12];
        let mut filled = 0;
        while filled < header.len() {
            let n = file.read(&mut header[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(Self::from_bytes(&header[..filled]))
    }
}

/// FFprobe JSON output structures
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    chapters: Vec<FfprobeChapter>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct FfprobeChapter {
    start_time: String,
    end_time: String,
    tags: Option<BTreeMap<String, String>>,
}

/// Picture stream holding the cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverStream {
    pub index: u32,
    pub codec_name: Option<String>,
}

impl CoverStream {
    /// JPEG covers are copied as-is; anything else is re-encoded to JPEG
    fn codec_args(&self) -> [&'static str; 2] {
        match self.codec_name.as_deref() {
            Some("mjpeg") => ["-c:v", "copy"],
            _ => ["-c:v", "mjpeg"],
        }
    }
}

/// Parsed FFprobe result, before cover bytes are fetched
#[derive(Debug, Clone, Default)]
pub struct ProbeSummary {
    pub chapters: Vec<Chapter>,
    pub tags: Option<BookTags>,
    pub cover_stream: Option<CoverStream>,
}

/// FFprobe/FFmpeg backed metadata reader
#[derive(Debug, Clone, Default)]
pub struct FfprobeReader {
    tools: ToolPaths,
}

impl FfprobeReader {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    /// Run FFprobe on `path` and parse its output
    pub async fn probe(&self, path: &Path) -> Result<ProbeSummary> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            "-show_chapters".into(),
            path.as_os_str().to_owned(),
        ];

        let output = run_tool(&self.tools.ffprobe, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::input_not_found(format!(
                "{}: not a readable audio container ({})",
                path.display(),
                stderr.trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(&json)
    }

    /// Parse FFprobe JSON output
    pub fn parse_probe_output(json: &str) -> Result<ProbeSummary> {
        let probe: FfprobeOutput = serde_json::from_str(json)?;

        let chapters = probe
            .chapters
            .into_iter()
            .enumerate()
            .map(|(idx, c)| {
                // FFprobe returns times as strings in seconds
                let start_seconds = parse_seconds(&c.start_time, 0.0, "start", idx);
                let end_seconds = parse_seconds(&c.end_time, start_seconds, "end", idx);

                let title = c
                    .tags
                    .as_ref()
                    .and_then(|t| {
                        t.iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case("title"))
                            .map(|(_, v)| v.trim().to_string())
                    })
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| format!("Chapter {}", idx + 1));

                let chapter = Chapter {
                    title,
                    start_ms: (start_seconds * 1000.0).round() as i64,
                    end_ms: (end_seconds * 1000.0).round() as i64,
                };
                if chapter.duration_ms() < 0 {
                    log::warn!(
                        "Chapter {} ('{}') ends before it starts",
                        idx + 1,
                        chapter.title
                    );
                }
                chapter
            })
            .collect();

        let tags = probe
            .format
            .and_then(|f| f.tags)
            .map(BookTags::new)
            .filter(|t| !t.is_empty());

        let is_video = |s: &&FfprobeStream| s.codec_type.as_deref() == Some("video");
        let cover_stream = probe
            .streams
            .iter()
            .filter(is_video)
            .find(|s| s.disposition.as_ref().map_or(false, |d| d.attached_pic == 1))
            .or_else(|| probe.streams.iter().find(is_video))
            .map(|s| CoverStream {
                index: s.index,
                codec_name: s.codec_name.clone(),
            });

        Ok(ProbeSummary {
            chapters,
            tags,
            cover_stream,
        })
    }

    /// Pipe the cover stream to stdout and collect it
    ///
    /// Failures are logged and yield `None`.
    pub async fn extract_cover(&self, path: &Path, stream: &CoverStream) -> Option<Vec<u8>> {
        let [codec_flag, codec] = stream.codec_args();
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-nostdin".into(),
            "-i".into(),
            path.as_os_str().to_owned(),
            "-map".into(),
            format!("0:{}", stream.index).into(),
            codec_flag.into(),
            codec.into(),
            "-frames:v".into(),
            "1".into(),
            "-f".into(),
            "image2pipe".into(),
            "-".into(),
        ];

        match run_tool(&self.tools.ffmpeg, &args).await {
            Ok(output) if output.status.success() && !output.stdout.is_empty() => {
                Some(output.stdout)
            }
            Ok(output) => {
                log::warn!(
                    "No cover art extracted from {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                log::warn!("Cover art extraction failed for {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl MetadataReader for FfprobeReader {
    async fn read_metadata(&self, path: &Path) -> Result<ContainerMetadata> {
        match ContainerFormat::sniff(path).await? {
            ContainerFormat::Mp4 => {}
            other => log::warn!(
                "{} does not look like an M4B file ({:?}), trying anyway",
                path.display(),
                other
            ),
        }

        let summary = self.probe(path).await?;
        log::debug!(
            "probed {}: {} chapters, tags: {}, cover stream: {:?}",
            path.display(),
            summary.chapters.len(),
            summary.tags.is_some(),
            summary.cover_stream
        );

        let cover = match &summary.cover_stream {
            Some(stream) => self.extract_cover(path, stream).await,
            None => None,
        };

        Ok(ContainerMetadata {
            chapters: summary.chapters,
            cover,
            tags: summary.tags,
        })
    }
}

/// Parse an FFprobe time in seconds, warning and using `fallback` when malformed
fn parse_seconds(value: &str, fallback: f64, which: &str, idx: usize) -> f64 {
    match value.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => seconds,
        _ => {
            log::warn!(
                "Chapter {} has a malformed {} time '{}', using {:.3}s",
                idx + 1,
                which,
                value,
                fallback
            );
            fallback
        }
    }
}

/// Run an external tool and capture its output
pub(crate) async fn run_tool(program: &Path, args: &[OsString]) -> Result<Output> {
    log::debug!(
        "running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::from_spawn(&program.display().to_string(), e))
}
