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


//! Output collision resolution
//!
//! Decides, for each output kind, whether to write it at its primary path,
//! write it under a suffixed name, or skip it altogether.
//!
//! # Policy
//! - Audio: an existing `<base>.oga` means a previous run already finished the
//!   conversion. The result is `Skip` and the encoder is never started.
//! - Cue/Cover/Info: an existing primary file is presumed to belong to another
//!   book converted into the same directory. It is left alone and the new
//!   file goes to `<base>_<default filename>`.
//!
//! Each decision looks only at its own primary path. The resolver performs no
//! writes; the only I/O is the existence check, which goes through the
//! [`ExistenceCheck`] capability so the policy can be tested without a disk.

use crate::error::{ConvertError, Result};
use crate::file::paths::OutputKind;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where (and whether) an output should be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Do not produce this output
    Skip,
    /// Write at the kind's primary path
    WritePrimary,
    /// Primary path is taken; write here instead
    WriteSuffixed(PathBuf),
}

impl Decision {
    /// Target path for this decision, `None` for `Skip`
    pub fn target(&self, kind: OutputKind, base_name: &str, output_dir: &Path) -> Option<PathBuf> {
        match self {
            Decision::Skip => None,
            Decision::WritePrimary => Some(kind.primary_path(base_name, output_dir)),
            Decision::WriteSuffixed(path) => Some(path.clone()),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip)
    }
}

/// Filesystem existence query
pub trait ExistenceCheck {
    /// Whether `path` exists. Errors (e.g. permission denied on stat) must be
    /// reported, not treated as absence.
    fn exists(&self, path: &Path) -> std::io::Result<bool>;
}

/// Existence check against the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskExistence;

impl ExistenceCheck for DiskExistence {
    fn exists(&self, path: &Path) -> std::io::Result<bool> {
        path.try_exists()
    }
}

/// Existence check against a fixed set of paths
#[derive(Debug, Default, Clone)]
pub struct InMemoryExistence {
    paths: HashSet<PathBuf>,
}

impl InMemoryExistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl ExistenceCheck for InMemoryExistence {
    fn exists(&self, path: &Path) -> std::io::Result<bool> {
        Ok(self.paths.contains(path))
    }
}

/// Decisions for all four outputs of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub base_name: String,
    pub output_dir: PathBuf,
    pub audio: Decision,
    pub cue: Decision,
    pub cover: Decision,
    pub info: Decision,
}

impl OutputPlan {
    pub fn decision(&self, kind: OutputKind) -> &Decision {
        match kind {
            OutputKind::Audio => &self.audio,
            OutputKind::Cue => &self.cue,
            OutputKind::Cover => &self.cover,
            OutputKind::Info => &self.info,
        }
    }

    /// Target path for `kind`, `None` when skipped
    pub fn target(&self, kind: OutputKind) -> Option<PathBuf> {
        self.decision(kind)
            .target(kind, &self.base_name, &self.output_dir)
    }
}

/// Collision resolver
#[derive(Debug, Default, Clone)]
pub struct CollisionResolver<F: ExistenceCheck> {
    fs: F,
}

impl CollisionResolver<DiskExistence> {
    /// Resolver backed by the real filesystem
    pub fn on_disk() -> Self {
        Self::new(DiskExistence)
    }
}

impl<F: ExistenceCheck> CollisionResolver<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Decide what to do with one output kind
    pub fn resolve(&self, kind: OutputKind, base_name: &str, output_dir: &Path) -> Result<Decision> {
        if base_name.is_empty() {
            return Err(ConvertError::InvalidPath(
                "base name must not be empty".to_string(),
            ));
        }

        let primary = kind.primary_path(base_name, output_dir);
        let occupied = self
            .fs
            .exists(&primary)
            .map_err(|e| ConvertError::from_io("stat", &primary, e))?;

        let decision = match (kind, occupied) {
            (OutputKind::Audio, true) => Decision::Skip,
            (OutputKind::Audio, false) => Decision::WritePrimary,
            (OutputKind::Cue | OutputKind::Cover | OutputKind::Info, false) => {
                Decision::WritePrimary
            }
            (OutputKind::Cue | OutputKind::Cover | OutputKind::Info, true) => {
                Decision::WriteSuffixed(kind.suffixed_path(base_name, output_dir))
            }
        };

        log::debug!(
            "resolved {} for '{}': {:?} (primary {} {})",
            kind,
            base_name,
            decision,
            primary.display(),
            if occupied { "exists" } else { "absent" }
        );

        Ok(decision)
    }

    /// Resolve all four kinds
    pub fn resolve_all(&self, base_name: &str, output_dir: &Path) -> Result<OutputPlan> {
        Ok(OutputPlan {
            base_name: base_name.to_string(),
            output_dir: output_dir.to_path_buf(),
            audio: self.resolve(OutputKind::Audio, base_name, output_dir)?,
            cue: self.resolve(OutputKind::Cue, base_name, output_dir)?,
            cover: self.resolve(OutputKind::Cover, base_name, output_dir)?,
            info: self.resolve(OutputKind::Info, base_name, output_dir)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    const DIR: &str = "/books";

    fn dir() -> &'static Path {
        Path::new(DIR)
    }

    fn resolver(existing: &[&str]) -> CollisionResolver<InMemoryExistence> {
        CollisionResolver::new(InMemoryExistence::with_paths(
            existing.iter().map(|name| dir().join(name)),
        ))
    }

    struct FailingStat;

    impl ExistenceCheck for FailingStat {
        fn exists(&self, _path: &Path) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "stat refused"))
        }
    }

    #[test]
    fn test_audio_skipped_when_oga_exists() {
        let r = resolver(&["Example.oga"]);
        assert_eq!(r.resolve(OutputKind::Audio, "Example", dir()).unwrap(), Decision::Skip);
    }

    #[test]
    fn test_audio_written_when_oga_absent() {
        let r = resolver(&[]);
        assert_eq!(
            r.resolve(OutputKind::Audio, "Example", dir()).unwrap(),
            Decision::WritePrimary
        );
    }

    #[test]
    fn test_audio_ignores_other_books_oga() {
        let r = resolver(&["Other.oga"]);
        assert_eq!(
            r.resolve(OutputKind::Audio, "Example", dir()).unwrap(),
            Decision::WritePrimary
        );
    }

    #[test]
    fn test_metadata_primary_when_absent() {
        let r = resolver(&[]);
        for kind in [OutputKind::Cue, OutputKind::Cover, OutputKind::Info] {
            assert_eq!(r.resolve(kind, "Example", dir()).unwrap(), Decision::WritePrimary);
        }
    }

    #[test]
    fn test_metadata_suffixed_when_present() {
        let r = resolver(&["Example.cue", "cover.jpg", "info.txt"]);
        assert_eq!(
            r.resolve(OutputKind::Cue, "Example", dir()).unwrap(),
            Decision::WriteSuffixed(PathBuf::from("/books/Example_Example.cue"))
        );
        assert_eq!(
            r.resolve(OutputKind::Cover, "Example", dir()).unwrap(),
            Decision::WriteSuffixed(PathBuf::from("/books/Example_cover.jpg"))
        );
        assert_eq!(
            r.resolve(OutputKind::Info, "Example", dir()).unwrap(),
            Decision::WriteSuffixed(PathBuf::from("/books/Example_info.txt"))
        );
    }

    #[test]
    fn test_metadata_never_skipped() {
        let r = resolver(&["Example.cue", "cover.jpg", "info.txt", "Example_info.txt"]);
        for kind in [OutputKind::Cue, OutputKind::Cover, OutputKind::Info] {
            assert!(!r.resolve(kind, "Example", dir()).unwrap().is_skip());
        }
    }

    #[test]
    fn test_audio_unaffected_by_metadata_files() {
        let r = resolver(&["Example.cue", "cover.jpg", "info.txt"]);
        assert_eq!(
            r.resolve(OutputKind::Audio, "Example", dir()).unwrap(),
            Decision::WritePrimary
        );
    }

    #[test]
    fn test_metadata_unaffected_by_oga() {
        let r = resolver(&["Example.oga"]);
        for kind in [OutputKind::Cue, OutputKind::Cover, OutputKind::Info] {
            assert_eq!(r.resolve(kind, "Example", dir()).unwrap(), Decision::WritePrimary);
        }
    }

    #[test]
    fn test_metadata_kinds_independent() {
        let r = resolver(&["info.txt"]);
        let plan = r.resolve_all("Example", dir()).unwrap();
        assert_eq!(plan.audio, Decision::WritePrimary);
        assert_eq!(plan.cue, Decision::WritePrimary);
        assert_eq!(plan.cover, Decision::WritePrimary);
        assert_eq!(
            plan.info,
            Decision::WriteSuffixed(PathBuf::from("/books/Example_info.txt"))
        );
    }

    #[test]
    fn test_plan_targets() {
        let r = resolver(&["Example.oga", "cover.jpg"]);
        let plan = r.resolve_all("Example", dir()).unwrap();
        assert_eq!(plan.target(OutputKind::Audio), None);
        assert_eq!(
            plan.target(OutputKind::Cue),
            Some(PathBuf::from("/books/Example.cue"))
        );
        assert_eq!(
            plan.target(OutputKind::Cover),
            Some(PathBuf::from("/books/Example_cover.jpg"))
        );
        assert_eq!(
            plan.target(OutputKind::Info),
            Some(PathBuf::from("/books/info.txt"))
        );
    }

    #[test]
    fn test_stat_failure_propagates() {
        let r = CollisionResolver::new(FailingStat);
        let err = r.resolve(OutputKind::Info, "Example", dir()).unwrap_err();
        assert!(matches!(err, ConvertError::PermissionDenied(_)));
    }

    #[test]
    fn test_empty_base_name_rejected() {
        let r = resolver(&[]);
        assert!(matches!(
            r.resolve(OutputKind::Audio, "", dir()),
            Err(ConvertError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_disk_existence() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("info.txt"), b"other book").unwrap();

        let r = CollisionResolver::on_disk();
        let plan = r.resolve_all("Example", temp.path()).unwrap();
        assert_eq!(plan.audio, Decision::WritePrimary);
        assert_eq!(
            plan.info,
            Decision::WriteSuffixed(temp.path().join("Example_info.txt"))
        );
        // resolving never touches the disk
        assert!(!temp.path().join("Example_info.txt").exists());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("info.txt")).unwrap(),
            "other book"
        );
    }
}
