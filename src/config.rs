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


//! Settings
//!
//! Resolution order (later wins):
//! 1. Built-in defaults
//! 2. TOML settings file (`--config`)
//! 3. `M4B2OGA_FFMPEG` / `M4B2OGA_FFPROBE` for tool paths still at their default
//! 4. Command-line overrides
//!
//! ```toml
//! output_dir = "/srv/audiobooks"
//!
//! [tools]
//! ffmpeg = "/usr/local/bin/ffmpeg"
//!
//! [encoder]
//! codec = "opus"
//! bitrate = { cbr = 64 }
//! ```

use crate::audio::converter::{Bitrate, Codec, ConversionOptions};
use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FFMPEG_ENV: &str = "M4B2OGA_FFMPEG";
pub const FFPROBE_ENV: &str = "M4B2OGA_FFPROBE";

const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_FFPROBE: &str = "ffprobe";

/// Locations of the external FFmpeg tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            ffprobe: PathBuf::from(DEFAULT_FFPROBE),
        }
    }
}

impl ToolPaths {
    /// Apply environment overrides to paths still at their defaults
    pub fn with_env(mut self) -> Self {
        self.apply_env(|key| std::env::var_os(key).map(PathBuf::from));
        self
    }

    fn apply_env<F: Fn(&str) -> Option<PathBuf>>(&mut self, lookup: F) {
        if self.ffmpeg == Path::new(DEFAULT_FFMPEG) {
            if let Some(path) = lookup(FFMPEG_ENV) {
                self.ffmpeg = path;
            }
        }
        if self.ffprobe == Path::new(DEFAULT_FFPROBE) {
            if let Some(path) = lookup(FFPROBE_ENV) {
                self.ffprobe = path;
            }
        }
    }
}

/// Complete settings for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output directory; `None` means next to each input
    pub output_dir: Option<PathBuf>,
    pub tools: ToolPaths,
    pub encoder: ConversionOptions,
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub codec: Option<Codec>,
    pub bitrate_kbps: Option<u32>,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings: file (if any), then environment, then overrides
    pub async fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ConvertError::configuration(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let settings = Self::from_toml(&text)?;
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            None => Self::default(),
        };

        settings.tools = settings.tools.with_env();
        settings.apply(overrides);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.output_dir {
            self.output_dir = Some(dir);
        }
        if let Some(ffmpeg) = overrides.ffmpeg {
            self.tools.ffmpeg = ffmpeg;
        }
        if let Some(ffprobe) = overrides.ffprobe {
            self.tools.ffprobe = ffprobe;
        }
        if let Some(codec) = overrides.codec {
            self.encoder.codec = codec;
        }
        if let Some(kbps) = overrides.bitrate_kbps {
            self.encoder.bitrate = Bitrate::Cbr(kbps);
        }
    }

    /// Reject settings the encoder cannot use
    pub fn validate(&self) -> Result<()> {
        match self.encoder.bitrate {
            Bitrate::Cbr(0) => Err(ConvertError::configuration("bitrate must be greater than 0")),
            Bitrate::Vbr(q) if q > 10 => Err(ConvertError::configuration(format!(
                "VBR quality must be between 0 and 10, got {}",
                q
            ))),
            Bitrate::Vbr(_) if self.encoder.codec == Codec::Opus => Err(
                ConvertError::configuration("Opus encoding takes a bitrate, not a VBR quality"),
            ),
            _ => Ok(()),
        }
    }
}
