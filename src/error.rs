//! Error types for the blueprint-ingest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IngestError`]: **Fatal**: the upload cannot proceed at all
//!   (unsupported MIME type, unreadable PDF, wrong password, every page
//!   failed). Returned as `Err(IngestError)` from the top-level `process*`
//!   functions and turned into a FAILED upload at the task boundary.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed to render or decode
//!   but its siblings are fine. Carried inside
//!   [`crate::output::UploadWarning::PageFailed`] so the upload can still
//!   become READY with warnings.
//!
//! Calibration input errors ([`IngestError::InvalidDistance`],
//! [`IngestError::InvalidCalibration`]) are raised synchronously before any
//! state is written.

use crate::status::UploadStatus;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the blueprint-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The declared MIME type is neither PDF nor an allowed raster type.
    #[error("Unsupported file type '{mime_type}'\nAllowed: application/pdf, image/png, image/jpeg, image/heic")]
    UnsupportedFormat { mime_type: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Declared as a PDF but the bytes do not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Calibration errors ────────────────────────────────────────────────
    /// Real-world calibration distance must be strictly positive and finite.
    #[error("Invalid calibration distance {distance}: must be greater than zero")]
    InvalidDistance { distance: f64 },

    /// Calibration points cannot define a scale (e.g. they coincide).
    #[error("Invalid calibration: {reason}")]
    InvalidCalibration { reason: String },

    // ── Orchestration errors ──────────────────────────────────────────────
    /// Every selected page failed; nothing can be persisted.
    #[error("No pages were successfully processed ({attempted} attempted).\nFirst error: {first_error}")]
    NoPagesProcessed { attempted: usize, first_error: String },

    /// An upload status change that would break the monotonic lifecycle.
    #[error("Invalid upload status transition {from} -> {to}")]
    InvalidTransition {
        from: UploadStatus,
        to: UploadStatus,
    },

    /// Processing stopped at a page boundary because cancellation was requested.
    #[error("Processing cancelled after {processed} page(s)")]
    Cancelled { processed: usize },

    /// A storage collaborator failed (fetching the original, persisting a page or record).
    #[error(transparent)]
    Storage(#[from] StorageError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The upload continues unless ALL pages fail.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The selection asked for a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: usize, total: usize },

    /// Raster bytes could not be decoded into an image.
    #[error("Page {page}: failed to decode image: {detail}")]
    DecodeFailed { page: usize, detail: String },

    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// PNG or JPEG encoding of the processed page failed.
    #[error("Page {page}: encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::OutOfRange { page, .. }
            | PageError::DecodeFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. } => *page,
        }
    }
}

/// Failure reported by a storage collaborator (object store, relational store).
#[derive(Debug, Clone, Error)]
#[error("storage error during {operation}: {detail}")]
pub struct StorageError {
    pub operation: String,
    pub detail: String,
}

impl StorageError {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = IngestError::UnsupportedFormat {
            mime_type: "text/plain".into(),
        };
        assert!(e.to_string().contains("text/plain"), "got: {e}");
    }

    #[test]
    fn invalid_distance_display() {
        let e = IngestError::InvalidDistance { distance: 0.0 };
        assert!(e.to_string().contains("greater than zero"));
    }

    #[test]
    fn no_pages_display_carries_first_error() {
        let e = IngestError::NoPagesProcessed {
            attempted: 3,
            first_error: "Page 1: failed to decode image: truncated".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempted"), "got: {msg}");
        assert!(msg.contains("truncated"), "got: {msg}");
    }

    #[test]
    fn invalid_transition_display() {
        let e = IngestError::InvalidTransition {
            from: UploadStatus::Ready,
            to: UploadStatus::Processing,
        };
        assert_eq!(
            e.to_string(),
            "Invalid upload status transition READY -> PROCESSING"
        );
    }

    #[test]
    fn storage_error_converts() {
        let e: IngestError = StorageError::new("fetch original", "bucket unreachable").into();
        assert!(matches!(e, IngestError::Storage(_)));
        assert!(e.to_string().contains("bucket unreachable"));
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::DecodeFailed {
            page: 4,
            detail: "bad huffman table".into(),
        };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().starts_with("Page 4:"));
        assert_eq!(PageError::OutOfRange { page: 9, total: 2 }.page(), 9);
    }
}
