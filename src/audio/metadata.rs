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


//! Container metadata, chapters and sidecar rendering
//!
//! # Tag Resolution
//! Tag keys are matched case-insensitively since M4B files in the wild use
//! `artist`, `ARTIST` and `Artist` interchangeably.
//! - Performer: `artist`, then `performer`, else empty
//! - Title: `album`, then `title`, else the input's base name
//! - Description: first non-empty of `description`, `comment`, `title_more`,
//!   `synopsis`, `summary`
//!
//! # Cue Sheet Layout
//! ```text
//! PERFORMER "Author"
//! TITLE "Book"
//! FILE "Book.oga" OGA
//!   TRACK 01 AUDIO
//!     TITLE "Chapter 1"
//!     INDEX 01 00:00:00
//! ```
//! Timestamps are MM:SS:FF with 75 frames per second; minutes are not wrapped
//! into hours.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tag keys tried, in order, for the performer
const PERFORMER_KEYS: [&str; 2] = ["artist", "performer"];

/// Tag keys tried, in order, for the title
const TITLE_KEYS: [&str; 2] = ["album", "title"];

/// Tag keys tried, in order, for the description
const DESCRIPTION_KEYS: [&str; 5] = ["description", "comment", "title_more", "synopsis", "summary"];

/// Chapter marker structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Start time in milliseconds
    pub start_ms: i64,
    /// End time in milliseconds
    pub end_ms: i64,
}

impl Chapter {
    /// Get chapter duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Format timestamp for cue sheet (MM:SS:FF)
    /// FF = frames, 75 frames per second
    pub fn format_cue_timestamp(ms: i64) -> String {
        let ms = ms.max(0);
        let total_seconds = ms / 1000;
        let frames = ((ms % 1000) * 75) / 1000;
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{:02}:{:02}:{:02}", minutes, seconds, frames)
    }
}

/// Raw descriptive tags of a container, keys as found in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookTags {
    tags: BTreeMap<String, String>,
}

impl BookTags {
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        Self { tags }
    }

    /// Case-insensitive tag lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First present tag among `keys`
    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// First non-blank tag among `keys`, trimmed
    fn first_non_blank(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn performer(&self) -> Option<&str> {
        self.first_of(&PERFORMER_KEYS)
    }

    pub fn title(&self) -> Option<&str> {
        self.first_of(&TITLE_KEYS)
    }

    pub fn description(&self) -> Option<&str> {
        self.first_non_blank(&DESCRIPTION_KEYS)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BookTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Everything the driver needs from the input container
#[derive(Debug, Clone, Default)]
pub struct ContainerMetadata {
    pub chapters: Vec<Chapter>,
    /// Embedded cover image bytes, as stored in the container
    pub cover: Option<Vec<u8>>,
    pub tags: Option<BookTags>,
}

impl ContainerMetadata {
    /// Resolved book info, falling back to `base_name` for the title
    pub fn book_info(&self, base_name: &str) -> BookInfo {
        BookInfo::from_tags(self.tags.as_ref(), base_name)
    }
}

/// Book info resolved from tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInfo {
    pub performer: String,
    pub title: String,
    pub description: Option<String>,
}

impl BookInfo {
    pub fn from_tags(tags: Option<&BookTags>, base_name: &str) -> Self {
        let performer = tags
            .and_then(BookTags::performer)
            .unwrap_or_default()
            .to_string();
        let title = tags
            .and_then(BookTags::title)
            .unwrap_or(base_name)
            .to_string();
        let description = tags.and_then(BookTags::description).map(str::to_string);

        Self {
            performer,
            title,
            description,
        }
    }

    /// Render the info text, `None` when there is no description to summarize
    pub fn render_info_text(&self) -> Option<String> {
        let description = self.description.as_deref()?;

        let mut text = format!("Title: {}\n", self.title);
        if !self.performer.is_empty() {
            text.push_str(&format!("Author: {}\n", self.performer));
        }
        text.push('\n');
        text.push_str(description);
        text.push('\n');
        Some(text)
    }
}

/// Cue sheet generation
pub struct CueSheet;

impl CueSheet {
    /// Generate cue sheet content for `audio_filename`
    pub fn generate(info: &BookInfo, chapters: &[Chapter], audio_filename: &str) -> String {
        let mut cue = String::new();

        cue.push_str(&format!("PERFORMER \"{}\"\n", Self::quote(&info.performer)));
        cue.push_str(&format!("TITLE \"{}\"\n", Self::quote(&info.title)));

        let file_type = Path::new(audio_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_uppercase)
            .unwrap_or_else(|| "OGA".to_string());
        cue.push_str(&format!("FILE \"{}\" {}\n", audio_filename, file_type));

        for (idx, chapter) in chapters.iter().enumerate() {
            cue.push_str(&format!("  TRACK {:02} AUDIO\n", idx + 1));
            cue.push_str(&format!("    TITLE \"{}\"\n", Self::quote(&chapter.title)));
            cue.push_str(&format!(
                "    INDEX 01 {}\n",
                Chapter::format_cue_timestamp(chapter.start_ms)
            ));
        }

        cue
    }

    // Cue strings cannot contain a double quote
    fn quote(value: &str) -> String {
        value.replace('"', "'")
    }
}

/// Container metadata reader
///
/// Implementations return chapters, the embedded cover (if any) and the
/// descriptive tags (if any). A file that cannot be read as a container is an
/// error; missing cover or tags are not.
#[allow(async_fn_in_trait)]
pub trait MetadataReader {
    async fn read_metadata(&self, path: &Path) -> Result<ContainerMetadata>;
}
