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


//! Output naming
//!
//! Every input yields up to four outputs. Their names are fully determined by
//! the input's base name:
//!
//! | Kind  | Primary name   | Suffixed name         |
//! |-------|----------------|-----------------------|
//! | Audio | `<base>.oga`   | (never suffixed)      |
//! | Cue   | `<base>.cue`   | `<base>_<base>.cue`   |
//! | Cover | `cover.jpg`    | `<base>_cover.jpg`    |
//! | Info  | `info.txt`     | `<base>_info.txt`     |

use crate::error::{ConvertError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of the converted audio
pub const OGA_EXTENSION: &str = "oga";

/// Fixed cover art file name
pub const COVER_FILENAME: &str = "cover.jpg";

/// Fixed info text file name
pub const INFO_FILENAME: &str = "info.txt";

/// Kind of output produced for an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Converted Ogg audio stream
    Audio,
    /// Chapter cue sheet
    Cue,
    /// Embedded cover image
    Cover,
    /// Plain-text book summary
    Info,
}

impl OutputKind {
    /// All kinds in processing order
    pub const ALL: [OutputKind; 4] = [
        OutputKind::Audio,
        OutputKind::Cue,
        OutputKind::Cover,
        OutputKind::Info,
    ];

    /// Whether this kind is a sidecar (renamed on collision rather than skipped)
    pub fn is_metadata(&self) -> bool {
        match self {
            OutputKind::Audio => false,
            OutputKind::Cue | OutputKind::Cover | OutputKind::Info => true,
        }
    }

    /// Default (primary) file name for this kind
    pub fn default_filename(&self, base_name: &str) -> String {
        match self {
            OutputKind::Audio => format!("{}.{}", base_name, OGA_EXTENSION),
            OutputKind::Cue => format!("{}.cue", base_name),
            OutputKind::Cover => COVER_FILENAME.to_string(),
            OutputKind::Info => INFO_FILENAME.to_string(),
        }
    }

    /// Primary path inside `output_dir`
    pub fn primary_path(&self, base_name: &str, output_dir: &Path) -> PathBuf {
        output_dir.join(self.default_filename(base_name))
    }

    /// Disambiguated path: `<base>_<default filename>` inside `output_dir`
    pub fn suffixed_path(&self, base_name: &str, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_{}", base_name, self.default_filename(base_name)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Audio => "audio",
            OutputKind::Cue => "cue",
            OutputKind::Cover => "cover",
            OutputKind::Info => "info",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Derive the base name of an input: its file name without the extension
pub fn base_name(input: &Path) -> Result<String> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            ConvertError::InvalidPath(format!(
                "Cannot derive a base name from {}",
                input.display()
            ))
        })?;

    // Path treats `.m4b` as a stem with no extension; there is no name before it
    if input.extension().is_none() && stem.starts_with('.') {
        return Err(ConvertError::InvalidPath(format!(
            "No name before the extension in {}",
            input.display()
        )));
    }

    if stem.trim().is_empty() {
        return Err(ConvertError::InvalidPath(format!(
            "Empty base name for {}",
            input.display()
        )));
    }

    Ok(stem.to_string())
}

/// Default output directory: the directory holding the input
pub fn default_output_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
