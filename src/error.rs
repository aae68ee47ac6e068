//! Error types for m4b2oga
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by where they originate: the input container, the output
//! directory, the external FFmpeg tools and configuration.
//!
//! ## Fatal vs. non-fatal
//!
//! Every variant here is fatal for the input file being processed. Missing
//! optional data (no cover, no description, no chapters) is not an error and
//! never produces one; the driver simply writes fewer artifacts.
//!
//! ## Mapping to the error taxonomy
//! - Input missing or not a readable container → `InputNotFound`
//! - stat/write failure on the output directory → `PermissionDenied`, `FileIoError`
//! - Encoder exited non-zero → `EncodeFailed`
//! - FFmpeg/FFprobe missing or misbehaving → `FfmpegNotFound`, `FfmpegError`

use std::path::Path;
use thiserror::Error;

/// Result type alias using our ConvertError type
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Main error type for m4b2oga
#[derive(Error, Debug)]
pub enum ConvertError {
    // ===== Input Errors =====

    /// Input path does not exist or is not a readable audio container
    #[error("Input not found: {0}")]
    InputNotFound(String),

    /// Input file name cannot yield a usable base name
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== Output/File Errors =====

    /// stat or write on the output location was refused by the OS
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Target file appeared between resolution and write
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    // ===== External Tool Errors =====

    /// Encoder exited non-zero or produced no output
    #[error("Audio encoding failed: {0}")]
    EncodeFailed(String),

    /// FFmpeg execution error
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// FFmpeg binary not found in PATH
    #[error("FFmpeg not found: {0}. Please install FFmpeg and ensure it's in your PATH.")]
    FfmpegNotFound(String),

    // ===== Configuration Errors =====

    /// Configuration file or override is invalid
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ===== External Library Errors =====

    /// JSON deserialization error (FFprobe output)
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// TOML deserialization error (settings file)
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConvertError {
    /// Map an I/O error on `path` to the matching variant
    ///
    /// `PermissionDenied` and `AlreadyExists` keep their own variants;
    /// everything else becomes `FileIoError`.
    pub fn from_io(operation: &str, path: &Path, err: std::io::Error) -> Self {
        let detail = format!("{}: {} - {}", operation, path.display(), err);
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied(detail),
            std::io::ErrorKind::AlreadyExists => {
                ConvertError::FileAlreadyExists(path.display().to_string())
            }
            _ => ConvertError::FileIoError(detail),
        }
    }

    /// Map a spawn failure of an external tool
    pub fn from_spawn(tool: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConvertError::FfmpegNotFound(tool.to_string())
        } else {
            ConvertError::FfmpegError(format!("Failed to execute {}: {}", tool, err))
        }
    }

    /// Create an InputNotFound error for a path
    pub fn input_not_found<S: Into<String>>(message: S) -> Self {
        ConvertError::InputNotFound(message.into())
    }

    /// Create a ConfigurationError with a message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        ConvertError::ConfigurationError(message.into())
    }

    /// Check if error came from FFmpeg/FFprobe
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            ConvertError::EncodeFailed(_)
                | ConvertError::FfmpegError(_)
                | ConvertError::FfmpegNotFound(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::FfmpegNotFound(tool) => format!(
                "'{}' is required but was not found. Please install FFmpeg and ensure it's in your PATH.",
                tool
            ),
            ConvertError::InputNotFound(path) => {
                format!("Cannot read input '{}'. Check the path and that it is an M4B file.", path)
            }
            ConvertError::PermissionDenied(detail) => {
                format!("Permission denied ({}). Check that the output directory is writable.", detail)
            }
            ConvertError::EncodeFailed(detail) => format!(
                "Encoding to OGA failed: {}. Sidecar files already written were kept; re-run to retry.",
                detail
            ),
            _ => self.to_string(),
        }
    }
}
