//! # blueprint-ingest
//!
//! Turn uploaded construction drawings (PDF sets or phone photos) into clean,
//! per-page rasters ready for annotation.
//!
//! ## Why this crate?
//!
//! Drawings arrive as multi-sheet PDFs or as photos taken on site: tilted a
//! few degrees, shot in portrait, washed out under site lighting. Annotation
//! and measurement need each sheet upright, legible, and at a known
//! resolution. This crate splits the upload into pages and runs every page
//! through the same fixed correction pipeline, flagging pages that are too
//! small or too soft to measure from rather than silently accepting them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + MIME)
//!  │
//!  ├─ 1. Stage    classify MIME type, spool PDFs to a scoped temp dir
//!  ├─ 2. Split    render-free page count, then one raster per selected page
//!  │              (pdfium for PDFs, image decoder + EXIF for photos)
//!  ├─ 3. Page     resolution ▸ blur ▸ deskew ▸ cardinal ▸ CLAHE ▸ thumbnail ▸ DPI
//!  └─ 4. Result   PNG + JPEG thumbnail per page, warnings, READY/FAILED
//! ```
//!
//! Calibration is separate: [`compute_scale`] turns two points and a known
//! real-world distance into pixels per unit for a page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blueprint_ingest::{process_upload, ProcessingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("A-101.pdf")?;
//!     let config = ProcessingConfig::default();
//!     let result = process_upload(bytes, "application/pdf", None, &config).await?;
//!     println!("{} ({} pages)", result.status(), result.pages.len());
//!     for warning in result.all_warnings() {
//!         eprintln!("{warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `blueprint-ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! blueprint-ingest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Native pdfium
//!
//! PDF rasterisation needs `libpdfium` at runtime. It is looked up in
//! `PDFIUM_LIB_PATH`, then the working directory, then the system library
//! path. Image uploads never touch pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod calibration;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod status;
pub mod stream;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use calibration::{
    compute_scale, CalibrationInput, CalibrationResult, LengthUnit, PageCalibrations, PixelPoint,
};
pub use config::{PageSelection, ProcessingConfig, ProcessingConfigBuilder};
pub use error::{IngestError, PageError, StorageError};
pub use output::{
    CardinalRotation, DocumentInfo, DpiSource, PageResult, PageWarning, UploadResult, UploadStats,
    UploadWarning,
};
pub use pipeline::input::DocumentKind;
pub use pipeline::render::{PdfRasterizer, PdfiumRasterizer};
pub use process::{
    inspect, process_file, process_to_dir, process_upload, process_upload_sync, UploadProcessor,
};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use status::{ProcessingStage, UploadRecord, UploadStatus};
pub use stream::PageStream;
pub use task::{run_upload_task, UploadStore};
pub use tokio_util::sync::CancellationToken;
