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


//! M4B to OGA transcoding
//!
//! # Conversion
//! - AAC in MP4 → Opus (default) or Vorbis in Ogg, always a re-encode
//! - Command: `ffmpeg -i input.m4b -map 0:a -c:a libopus -b:a 48k -map_metadata 0 -map_chapters 0 -vn -n output.oga`
//! - Opus: constant target bitrate in kbps (48k default, plenty for speech)
//! - Vorbis: bitrate in kbps, or VBR quality `-q:a 0..10`
//!
//! ## Partial Output
//! FFmpeg writes to `<output>.part` (forced to the Ogg muxer). Only a
//! successful encode is moved to the real name, so an existing `<base>.oga`
//! always means a finished conversion. A failed encode removes the `.part`
//! file and nothing else.
//!
//! ## Overwrite Policy
//! The `.part` file is promoted with a hard link, which fails if the target
//! appeared in the meantime; the target is never clobbered.

use crate::audio::decoder::run_tool;
use crate::config::ToolPaths;
use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

/// Suffix of the in-progress encode next to the final output
pub const PARTIAL_SUFFIX: &str = "part";

/// Ogg audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Opus,
    Vorbis,
}

impl Codec {
    /// FFmpeg encoder name
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Opus => "libopus",
            Self::Vorbis => "libvorbis",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "opus" => Ok(Self::Opus),
            "vorbis" => Ok(Self::Vorbis),
            other => Err(ConvertError::configuration(format!(
                "Unknown codec '{}', expected 'opus' or 'vorbis'",
                other
            ))),
        }
    }
}

/// Bitrate options for lossy encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bitrate {
    /// Target bitrate in kbps
    Cbr(u32),
    /// Variable bitrate quality (Vorbis only, 0-10, higher is better)
    Vbr(u8),
}

impl Default for Bitrate {
    fn default() -> Self {
        Self::Cbr(48)
    }
}

/// Audio conversion options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub codec: Codec,

    pub bitrate: Bitrate,

    /// Copy container tags into the OGA
    pub preserve_metadata: bool,

    /// Copy chapter markers into the OGA
    pub preserve_chapters: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            bitrate: Bitrate::default(),
            preserve_metadata: true,
            preserve_chapters: true,
        }
    }
}

/// Audio transcoder
///
/// Produces an Ogg audio stream at `output` from the audio in `input`.
#[allow(async_fn_in_trait)]
pub trait Transcoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Audio converter
/// Handles conversion to OGA using FFmpeg
#[derive(Debug, Clone, Default)]
pub struct AudioConverter {
    options: ConversionOptions,
    tools: ToolPaths,
}

impl AudioConverter {
    /// Create new converter with options
    pub fn new(options: ConversionOptions, tools: ToolPaths) -> Self {
        Self { options, tools }
    }

    /// Build FFmpeg arguments for conversion
    fn build_ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-map".into(),
            "0:a".into(),
            "-c:a".into(),
            self.options.codec.encoder().into(),
        ];

        match self.options.bitrate {
            Bitrate::Cbr(kbps) => {
                args.push("-b:a".into());
                args.push(format!("{}k", kbps).into());
            }
            Bitrate::Vbr(quality) => {
                args.push("-q:a".into());
                args.push(quality.to_string().into());
            }
        }

        if self.options.preserve_metadata {
            args.push("-map_metadata".into());
            args.push("0".into());
        }

        if self.options.preserve_chapters {
            args.push("-map_chapters".into());
            args.push("0".into());
        }

        // Cover art is extracted separately
        args.push("-vn".into());
        // The .part extension tells FFmpeg nothing about the container
        args.push("-f".into());
        args.push("ogg".into());
        args.push("-n".into());
        args.push(output.as_os_str().to_owned());

        args
    }
}

/// In-progress path for `output`: `<output>.part`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Remove a `.part` file, logging instead of failing
async fn discard_partial(partial: &Path) {
    match fs::remove_file(partial).await {
        Ok(()) => log::debug!("removed partial output {}", partial.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "could not remove partial output {}: {}",
            partial.display(),
            e
        ),
    }
}

/// Move a finished `.part` file to `output` without replacing anything there
async fn promote_partial(partial: &Path, output: &Path) -> Result<()> {
    match fs::hard_link(partial, output).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            discard_partial(partial).await;
            return Err(ConvertError::from_io("link", output, e));
        }
        Err(e) => {
            // No hard links on this filesystem
            log::debug!("hard link failed ({}), falling back to rename", e);
            let taken = fs::try_exists(output)
                .await
                .map_err(|e| ConvertError::from_io("stat", output, e))?;
            if taken {
                discard_partial(partial).await;
                return Err(ConvertError::FileAlreadyExists(output.display().to_string()));
            }
            return fs::rename(partial, output)
                .await
                .map_err(|e| ConvertError::from_io("rename", partial, e));
        }
    }

    discard_partial(partial).await;
    Ok(())
}

impl Transcoder for AudioConverter {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let input_present = fs::try_exists(input)
            .await
            .map_err(|e| ConvertError::from_io("stat", input, e))?;
        if !input_present {
            return Err(ConvertError::input_not_found(input.display().to_string()));
        }

        log::info!(
            "Encoding {} -> {} ({} {:?})",
            input.display(),
            output.display(),
            self.options.codec,
            self.options.bitrate
        );

        // Leftover from an interrupted run
        let partial = partial_path(output);
        discard_partial(&partial).await;

        let args = self.build_ffmpeg_args(input, &partial);
        let result = match run_tool(&self.tools.ffmpeg, &args).await {
            Ok(result) => result,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if !result.status.success() {
            discard_partial(&partial).await;
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConvertError::EncodeFailed(format!(
                "FFmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let created = fs::try_exists(&partial)
            .await
            .map_err(|e| ConvertError::from_io("stat", &partial, e))?;
        if !created {
            return Err(ConvertError::EncodeFailed(
                "Output file was not created".to_string(),
            ));
        }

        promote_partial(&partial, output).await
    }
}
