//! End-to-end extraction against a temporary directory
//!
//! The container reader and the encoder are replaced by stubs so the tests run
//! without FFmpeg. Everything else (resolution, directory creation, sidecar
//! writes) runs against the real filesystem.

use m4b2oga::audio::{
    AudioConverter, BookTags, Chapter, ContainerMetadata, ConversionOptions, MetadataReader,
    Transcoder,
};
use m4b2oga::{
    ArtifactStatus, CollisionResolver, ConvertError, Decision, Extractor, OutputKind, Result,
    ToolPaths,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Returns fixed metadata for every input
struct StubReader {
    metadata: ContainerMetadata,
}

impl MetadataReader for StubReader {
    async fn read_metadata(&self, _path: &Path) -> Result<ContainerMetadata> {
        Ok(self.metadata.clone())
    }
}

/// Records calls and writes a fake OGA
#[derive(Default)]
struct RecordingTranscoder {
    calls: RefCell<Vec<(PathBuf, PathBuf)>>,
    fail: bool,
}

impl RecordingTranscoder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Transcoder for &RecordingTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push((input.to_path_buf(), output.to_path_buf()));
        if self.fail {
            return Err(ConvertError::EncodeFailed("exit status: 1".to_string()));
        }
        tokio::fs::write(output, b"OggS fake").await?;
        Ok(())
    }
}

const COVER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

fn full_metadata() -> ContainerMetadata {
    ContainerMetadata {
        chapters: vec![
            Chapter {
                title: "Opening".to_string(),
                start_ms: 0,
                end_ms: 180_500,
            },
            Chapter {
                title: "The \"Middle\"".to_string(),
                start_ms: 180_500,
                end_ms: 400_000,
            },
        ],
        cover: Some(COVER.to_vec()),
        tags: Some(
            [
                ("ARTIST", "John Doe"),
                ("album", "Example Book"),
                ("comment", "A story about examples."),
            ]
            .into_iter()
            .collect::<BookTags>(),
        ),
    }
}

/// Temp directory holding an `Example.m4b`
fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("Example.m4b");
    std::fs::write(&input, b"not really an m4b").unwrap();
    (temp_dir, input)
}

fn extractor<'t>(
    metadata: ContainerMetadata,
    transcoder: &'t RecordingTranscoder,
) -> Extractor<StubReader, &'t RecordingTranscoder> {
    Extractor::new(StubReader { metadata }, transcoder, CollisionResolver::on_disk())
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn scenario_a_empty_directory_produces_all_outputs() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    let transcoder = RecordingTranscoder::default();

    let report = extractor(full_metadata(), &transcoder)
        .process(&input)
        .await
        .unwrap();

    assert_eq!(report.base_name, "Example");
    assert_eq!(report.output_dir, dir);
    for kind in OutputKind::ALL {
        let outcome = report.outcome(kind).unwrap();
        assert_eq!(outcome.decision, Decision::WritePrimary, "{}", kind);
        assert_eq!(
            outcome.status,
            ArtifactStatus::Written(kind.primary_path("Example", dir)),
            "{}",
            kind
        );
    }

    assert!(dir.join("Example.oga").is_file());
    assert_eq!(transcoder.call_count(), 1);
    assert_eq!(
        transcoder.calls.borrow()[0],
        (input.clone(), dir.join("Example.oga"))
    );

    let cue = read(&dir.join("Example.cue"));
    assert!(cue.contains("PERFORMER \"John Doe\""));
    assert!(cue.contains("TITLE \"Example Book\""));
    assert!(cue.contains("FILE \"Example.oga\" OGA"));
    assert!(cue.contains("  TRACK 02 AUDIO"));
    assert!(cue.contains("TITLE \"The 'Middle'\""));
    assert!(cue.contains("INDEX 01 03:00:37"));

    assert_eq!(std::fs::read(dir.join("cover.jpg")).unwrap(), COVER);

    let info = read(&dir.join("info.txt"));
    assert!(info.starts_with("Title: Example Book\nAuthor: John Doe\n"));
    assert!(info.contains("A story about examples."));
}

#[tokio::test]
async fn scenario_b_existing_oga_skips_encode() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    std::fs::write(dir.join("Example.oga"), b"previous run").unwrap();
    let transcoder = RecordingTranscoder::default();

    let report = extractor(full_metadata(), &transcoder)
        .process(&input)
        .await
        .unwrap();

    assert_eq!(transcoder.call_count(), 0);
    assert!(!report.transcoded());
    let audio = report.outcome(OutputKind::Audio).unwrap();
    assert_eq!(audio.decision, Decision::Skip);
    assert_eq!(audio.status, ArtifactStatus::Skipped);
    assert_eq!(read(&dir.join("Example.oga")), "previous run");

    assert!(dir.join("Example.cue").is_file());
    assert!(dir.join("cover.jpg").is_file());
    assert!(dir.join("info.txt").is_file());
}

#[tokio::test]
async fn scenario_c_foreign_info_gets_suffixed() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    std::fs::write(dir.join("info.txt"), b"Title: Another Book\n").unwrap();
    let transcoder = RecordingTranscoder::default();

    let report = extractor(full_metadata(), &transcoder)
        .process(&input)
        .await
        .unwrap();

    let info = report.outcome(OutputKind::Info).unwrap();
    assert_eq!(
        info.decision,
        Decision::WriteSuffixed(dir.join("Example_info.txt"))
    );
    assert_eq!(read(&dir.join("info.txt")), "Title: Another Book\n");
    assert!(read(&dir.join("Example_info.txt")).starts_with("Title: Example Book\n"));

    // the other kinds are unaffected
    assert!(dir.join("Example.cue").is_file());
    assert!(dir.join("cover.jpg").is_file());
    assert!(!dir.join("Example_cover.jpg").exists());
}

#[tokio::test]
async fn scenario_d_no_cover_writes_no_cover_file() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    let transcoder = RecordingTranscoder::default();

    let mut metadata = full_metadata();
    metadata.cover = None;

    let report = extractor(metadata, &transcoder)
        .process(&input)
        .await
        .unwrap();

    assert_eq!(
        report.outcome(OutputKind::Cover).unwrap().status,
        ArtifactStatus::Unavailable
    );
    assert!(!dir.join("cover.jpg").exists());
    assert!(!dir.join("Example_cover.jpg").exists());
    assert!(dir.join("Example.oga").is_file());
}

#[tokio::test]
async fn missing_tags_and_chapters_write_only_audio() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    let transcoder = RecordingTranscoder::default();

    let report = extractor(ContainerMetadata::default(), &transcoder)
        .process(&input)
        .await
        .unwrap();

    assert_eq!(report.written(), vec![dir.join("Example.oga").as_path()]);
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Example.m4b", "Example.oga"]);
}

#[tokio::test]
async fn failed_encode_keeps_sidecars_and_rerun_resumes() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();

    let failing = RecordingTranscoder::failing();
    let err = extractor(full_metadata(), &failing)
        .process(&input)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::EncodeFailed(_)));
    assert!(dir.join("Example.cue").is_file());
    assert!(dir.join("cover.jpg").is_file());
    assert!(dir.join("info.txt").is_file());
    assert!(!dir.join("Example.oga").exists());

    // Second run: audio gets encoded, sidecars from the first run stay put
    let transcoder = RecordingTranscoder::default();
    let report = extractor(full_metadata(), &transcoder)
        .process(&input)
        .await
        .unwrap();
    assert!(report.transcoded());
    assert_eq!(
        report.outcome(OutputKind::Cover).unwrap().decision,
        Decision::WriteSuffixed(dir.join("Example_cover.jpg"))
    );
    assert_eq!(std::fs::read(dir.join("cover.jpg")).unwrap(), COVER);
}

#[tokio::test]
async fn occupied_suffixed_path_is_left_alone() {
    let (temp_dir, input) = setup();
    let dir = temp_dir.path();
    std::fs::write(dir.join("info.txt"), b"first").unwrap();
    std::fs::write(dir.join("Example_info.txt"), b"second").unwrap();
    let transcoder = RecordingTranscoder::default();

    let report = extractor(full_metadata(), &transcoder)
        .process(&input)
        .await
        .unwrap();

    assert_eq!(
        report.outcome(OutputKind::Info).unwrap().status,
        ArtifactStatus::AlreadyPresent(dir.join("Example_info.txt"))
    );
    assert_eq!(read(&dir.join("info.txt")), "first");
    assert_eq!(read(&dir.join("Example_info.txt")), "second");
    assert!(report.transcoded());
}

#[tokio::test]
async fn output_dir_override_is_created() {
    let (temp_dir, input) = setup();
    let out = temp_dir.path().join("converted").join("books");
    let transcoder = RecordingTranscoder::default();

    let report = extractor(full_metadata(), &transcoder)
        .with_output_dir(Some(out.clone()))
        .process(&input)
        .await
        .unwrap();

    assert_eq!(report.output_dir, out);
    assert!(out.join("Example.oga").is_file());
    assert!(out.join("Example.cue").is_file());
    assert!(!temp_dir.path().join("Example.oga").exists());
}

#[tokio::test]
async fn missing_input_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let transcoder = RecordingTranscoder::default();

    let err = extractor(full_metadata(), &transcoder)
        .process(&temp_dir.path().join("Missing.m4b"))
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::InputNotFound(_)));
    assert_eq!(transcoder.call_count(), 0);
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

/// Executable shell script standing in for ffmpeg: writes `payload` to its
/// last argument, then exits with `status`
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path, name: &str, payload: &str, status: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\nfor last; do :; done\nprintf '{}' > \"$last\"\nexit {}\n",
        payload, status
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn converter(ffmpeg: PathBuf) -> AudioConverter {
    AudioConverter::new(
        ConversionOptions::default(),
        ToolPaths {
            ffmpeg,
            ..Default::default()
        },
    )
}

#[cfg(unix)]
#[tokio::test]
async fn truncated_encode_is_not_mistaken_for_finished_audio() {
    let (temp_dir, input) = setup();
    let tools_dir = TempDir::new().unwrap();
    let crashing = fake_ffmpeg(tools_dir.path(), "ffmpeg-crash", "OggS-trunc", 1);
    let working = fake_ffmpeg(tools_dir.path(), "ffmpeg-ok", "OggS-full", 0);
    let dir = temp_dir.path();

    let first = Extractor::new(
        StubReader {
            metadata: ContainerMetadata::default(),
        },
        converter(crashing),
        CollisionResolver::on_disk(),
    );
    let err = first.process(&input).await.unwrap_err();
    assert!(matches!(err, ConvertError::EncodeFailed(_)));
    assert!(!dir.join("Example.oga").exists());
    assert!(!dir.join("Example.oga.part").exists());
    assert_eq!(
        CollisionResolver::on_disk()
            .resolve(OutputKind::Audio, "Example", dir)
            .unwrap(),
        Decision::WritePrimary
    );

    let second = Extractor::new(
        StubReader {
            metadata: ContainerMetadata::default(),
        },
        converter(working),
        CollisionResolver::on_disk(),
    );
    let report = second.process(&input).await.unwrap();
    let audio = report.outcome(OutputKind::Audio).unwrap();
    assert_eq!(audio.decision, Decision::WritePrimary);
    assert!(report.transcoded());
    assert_eq!(read(&dir.join("Example.oga")), "OggS-full");
    assert!(!dir.join("Example.oga.part").exists());
}

#[tokio::test]
async fn batch_with_everything_skipped_succeeds() {
    let (temp_dir, input) = setup();
    std::fs::write(temp_dir.path().join("Example.oga"), b"previous run").unwrap();
    let transcoder = RecordingTranscoder::default();

    let mut seen = Vec::new();
    let summary = extractor(ContainerMetadata::default(), &transcoder)
        .process_all(&[input.clone()], |path, result| {
            seen.push((path.to_path_buf(), result.is_ok()))
        })
        .await;

    assert!(summary.is_success());
    assert_eq!(summary.processed(), 1);
    assert_eq!(seen, vec![(input, true)]);
    assert!(summary.reports[0].written().is_empty());
    assert_eq!(transcoder.call_count(), 0);
}

#[tokio::test]
async fn batch_continues_past_missing_input_and_fails() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let first = dir.join("First.m4b");
    let missing = dir.join("Missing.m4b");
    let last = dir.join("Last.m4b");
    std::fs::write(&first, b"m4b").unwrap();
    std::fs::write(&last, b"m4b").unwrap();
    let transcoder = RecordingTranscoder::default();

    let summary = extractor(full_metadata(), &transcoder)
        .process_all(&[first, missing.clone(), last], |_, _| {})
        .await;

    assert!(!summary.is_success());
    assert_eq!(summary.processed(), 3);
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, missing);
    assert!(matches!(summary.failures[0].1, ConvertError::InputNotFound(_)));

    assert_eq!(transcoder.call_count(), 2);
    assert!(dir.join("First.oga").is_file());
    assert!(dir.join("Last.oga").is_file());
    // both books share the directory: the second cover goes to its suffixed name
    assert!(dir.join("cover.jpg").is_file());
    assert!(dir.join("Last_cover.jpg").is_file());
}
