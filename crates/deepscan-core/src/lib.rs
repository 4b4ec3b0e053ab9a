#![warn(missing_docs)]
//! # deepscan-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `deepscan` workspace.
//!
//! ## Responsibilities
//! - Represent candidate images as opaque handles with type/size metadata.
//! - Validate candidates against the accepted image types and size ceiling.
//! - Model provider results, history entries, session mode, and scan status.
//!
//! ## Data flow
//! The upload entry point builds an [`ImageFile`], [`validate`] gates it, the
//! gateway returns [`ProviderResult`] lists, and completed scans may be turned
//! into a [`HistoryEntry`].
//!
//! ## Ownership and lifetimes
//! Handles own their name/MIME strings and, for in-memory images, their bytes.
//! On-disk images keep only their path; bytes are read by the gateway.
//!
//! ## Error model
//! Rejections are [`ValidationError`] values carrying the user-facing reason.
//! Filesystem and timestamp failures are [`CoreError`] values.
//!
//! ## Example
//! ```rust
//! use deepscan_core::{validate, ImageFile, ValidationError};
//!
//! let png = ImageFile::in_memory("cat.png", "image/png", vec![0; 16]);
//! assert!(validate(&png).is_ok());
//!
//! let pdf = ImageFile::in_memory("doc.pdf", "application/pdf", vec![0; 16]);
//! assert!(matches!(validate(&pdf), Err(ValidationError::UnsupportedType { .. })));
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// MIME types accepted by the validator.
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/tiff",
];

/// Largest accepted image size in megabytes.
pub const MAX_FILE_SIZE_MB: u64 = 8;

/// Largest accepted image size in bytes (inclusive).
pub const MAX_FILE_SIZE_BYTES: u64 = MAX_FILE_SIZE_MB * 1024 * 1024;

/// MIME type used when an extension is not recognized.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Where the bytes of an [`ImageFile`] live.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image on the local filesystem.
    Path(PathBuf),
    /// Image already held in memory.
    Memory(Vec<u8>),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// Opaque candidate image handle.
///
/// The core reads only [`ImageFile::mime`] and [`ImageFile::size`]; the bytes
/// are handed to the gateway untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    mime: String,
    size: u64,
    source: ImageSource,
}

impl ImageFile {
    /// Creates an in-memory image handle.
    pub fn in_memory(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            size: bytes.len() as u64,
            source: ImageSource::Memory(bytes),
        }
    }

    /// Creates a handle for an on-disk image, reading only its metadata.
    ///
    /// The MIME type is derived from the file extension.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] when the file metadata cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            mime: mime_for_path(path).to_string(),
            size: metadata.len(),
            source: ImageSource::Path(path.to_path_buf()),
        })
    }

    /// Display name of the image.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared MIME type.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Backing source of the image bytes.
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Reference recorded in history entries and previews.
    pub fn reference(&self) -> String {
        match &self.source {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Memory(_) => self.name.clone(),
        }
    }
}

/// Derives a MIME type from a path extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => FALLBACK_MIME_TYPE,
    }
}

/// Validates a candidate image against type and size policy.
///
/// Only metadata is inspected. The type check runs before the size check.
///
/// # Errors
/// Returns [`ValidationError::UnsupportedType`] for MIME types outside
/// [`ALLOWED_MIME_TYPES`] and [`ValidationError::TooLarge`] above
/// [`MAX_FILE_SIZE_BYTES`].
pub fn validate(file: &ImageFile) -> Result<(), ValidationError> {
    if !ALLOWED_MIME_TYPES.contains(&file.mime()) {
        return Err(ValidationError::UnsupportedType {
            mime: file.mime().to_string(),
        });
    }

    if file.size() > MAX_FILE_SIZE_BYTES {
        return Err(ValidationError::TooLarge { size: file.size() });
    }

    Ok(())
}

/// Reasons a candidate image is rejected.
///
/// The `Display` form is the one-line status message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// MIME type is not an accepted image type.
    #[error("Unsupported file type")]
    UnsupportedType {
        /// Offending MIME type.
        mime: String,
    },
    /// File exceeds the size ceiling.
    #[error("File too large (max 8MB)")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
    },
}

/// One provider verdict returned by the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Provider name.
    pub provider: String,
    /// Display score, possibly embedding a number (for example `"98% SAFE"`).
    #[serde(deserialize_with = "score_as_string")]
    pub score: String,
    /// Optional verdict tag such as `safe` or `warning`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ProviderResult {
    /// Creates a result without a verdict tag.
    pub fn new(provider: impl Into<String>, score: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            score: score.into(),
            status: None,
        }
    }

    /// Attaches a verdict tag.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

fn score_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawScore {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawScore::deserialize(deserializer)? {
        RawScore::Text(text) => text,
        RawScore::Number(number) => number.to_string(),
    })
}

/// Persisted record of one saved scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Reference to the scanned image.
    pub image: String,
    /// Provider results shown for the scan.
    pub results: Vec<ProviderResult>,
    /// RFC 3339 timestamp of the save.
    #[serde(rename = "time")]
    pub timestamp: String,
}

impl HistoryEntry {
    /// Creates an entry stamped with the current UTC time.
    ///
    /// # Errors
    /// Returns [`CoreError::Timestamp`] when the clock cannot be formatted.
    pub fn stamped_now(
        image: impl Into<String>,
        results: Vec<ProviderResult>,
    ) -> Result<Self, CoreError> {
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
        Ok(Self {
            image: image.into(),
            results,
            timestamp,
        })
    }
}

/// Whether the current user is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Unauthenticated user; persistence is refused.
    #[default]
    Guest,
    /// Authenticated user; persistence is allowed.
    Secure,
}

impl SessionMode {
    /// Interprets the persisted login flag. Only the literal `"true"` is secure.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("true") => Self::Secure,
            _ => Self::Guest,
        }
    }

    /// Returns `true` for [`SessionMode::Secure`].
    pub fn is_secure(self) -> bool {
        self == Self::Secure
    }

    /// Header label for the mode.
    pub fn label(self) -> &'static str {
        match self {
            Self::Guest => "Guest Mode",
            Self::Secure => "Secure Mode",
        }
    }
}

/// Lifecycle status of the scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanStatus {
    /// No scan is open.
    #[default]
    Idle,
    /// A candidate file is being validated.
    Validating,
    /// The gateway call is in flight.
    AwaitingResult,
    /// The gateway returned results.
    Completed,
    /// The gateway call failed.
    Failed,
}

impl ScanStatus {
    /// Returns `true` while a scan occupies the single in-flight slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Validating | Self::AwaitingResult)
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::AwaitingResult => "awaiting-result",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Error type for core filesystem and timestamp failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Image metadata could not be read.
    #[error("cannot read image metadata at '{path}': {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Timestamp formatting failed.
    #[error("timestamp formatting failure: {0}")]
    Timestamp(#[from] time::error::Format),
}
