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


//! Audio inspection, conversion, and metadata
//!
//! # Module Organization
//!
//! ## decoder
//! Container inspection:
//! - `FfprobeReader` - `MetadataReader` backed by FFprobe/FFmpeg
//! - `ContainerFormat` - Magic-byte sniffing (MP4, Ogg)
//!
//! ## converter
//! M4B to OGA encoding:
//! - `AudioConverter` - `Transcoder` backed by FFmpeg
//! - `ConversionOptions` - Codec, bitrate, metadata/chapter passthrough
//!
//! ## metadata
//! Book metadata and sidecar content:
//! - `ContainerMetadata` - Chapters, cover bytes, tags
//! - `BookInfo` - Performer/title/description resolved from tags
//! - `CueSheet` - Cue sheet rendering
//!
//! # FFmpeg Integration
//!
//! FFmpeg and FFprobe must be installed and available in PATH (or configured):
//! - FFmpeg: Opus/Vorbis encoding, cover art extraction
//! - FFprobe: Tags, chapters, stream layout
//!
//! ## Installation
//! - macOS: `brew install ffmpeg`
//! - Linux: `apt-get install ffmpeg` or `yum install ffmpeg`
//! - Windows: Download from https://ffmpeg.org/download.html

pub mod converter;
pub mod decoder;
pub mod metadata;

// Re-export commonly used types for convenience
pub use converter::{AudioConverter, Bitrate, Codec, ConversionOptions, Transcoder};
pub use decoder::{ContainerFormat, FfprobeReader};
pub use metadata::{BookInfo, BookTags, Chapter, ContainerMetadata, CueSheet, MetadataReader};
