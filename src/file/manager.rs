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


//! File operations for sidecar artifacts
//!
//! # Key Operations
//! - Output directory creation
//! - Create-only writes: an existing file is never truncated or replaced
//! - Cleanup of a partially written file when a write fails midway

use crate::error::{ConvertError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File manager rooted at one output directory
#[derive(Debug)]
pub struct FileManager {
    output_dir: PathBuf,
}

impl FileManager {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Ensure the output directory exists, creating parents as needed
    pub async fn ensure_output_dir(&self) -> Result<()> {
        Self::ensure_directory_exists(&self.output_dir).await
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(path: &Path) -> Result<()> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(ConvertError::InvalidPath(format!(
                    "{} exists but is not a directory",
                    path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConvertError::from_io("stat", path, e)),
        }

        log::debug!("creating output directory {}", path.display());
        fs::create_dir_all(path)
            .await
            .map_err(|e| ConvertError::from_io("create_dir", path, e))
    }

    /// Write `contents` to a file that must not exist yet
    ///
    /// Fails with `FileAlreadyExists` if something is already at `path`. If the
    /// write fails after the file was created, the partial file is removed.
    pub async fn write_new(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| ConvertError::from_io("create", path, e))?;

        let written: std::io::Result<()> = async {
            file.write_all(contents).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(path).await {
                log::warn!(
                    "could not remove partial file {}: {}",
                    path.display(),
                    cleanup
                );
            }
            return Err(ConvertError::from_io("write", path, e));
        }

        log::debug!("wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }
}
