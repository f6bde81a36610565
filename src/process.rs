//! Eager (whole-upload) processing entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for every selected page, then
//! return one [`UploadResult`]. Use [`UploadProcessor::stream_pages`] instead
//! when pages should be persisted as they complete, so a 40-sheet set never
//! holds more than one processed page in memory.
//!
//! Both share `UploadProcessor::drive`, the single loop that applies the
//! selection, runs each page through the fixed pipeline, fires progress
//! callbacks, and observes cancellation between pages.

use crate::config::{PageSelection, ProcessingConfig};
use crate::error::{IngestError, PageError};
use crate::output::{DocumentInfo, PageResult, UploadResult, UploadStats, UploadWarning};
use crate::pipeline::input::{self, DocumentKind, StagedDocument};
use crate::pipeline::page::PageProcessor;
use crate::pipeline::render::{PdfRasterizer, PdfiumRasterizer};
use crate::pipeline::split::{DocumentSplitter, SplitSummary};
use futures::StreamExt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Processes uploads with one configuration and one rasterizer.
///
/// Cheap to clone; share one per worker.
#[derive(Clone)]
pub struct UploadProcessor {
    pub(crate) config: ProcessingConfig,
    pub(crate) rasterizer: Arc<dyn PdfRasterizer>,
}

impl UploadProcessor {
    pub fn new(config: ProcessingConfig, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        Self { config, rasterizer }
    }

    /// Use pdfium, located via `PDFIUM_LIB_PATH` or the default search.
    pub fn with_pdfium(config: ProcessingConfig) -> Self {
        Self::new(config, Arc::new(PdfiumRasterizer::from_env()))
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process an upload held in memory.
    ///
    /// # Returns
    /// `Ok(UploadResult)` whenever the document could be opened, even if
    /// every page failed (check [`UploadResult::status`]).
    ///
    /// # Errors
    /// Fatal problems only: unsupported MIME type, unreadable or encrypted
    /// PDF, cancellation before the last page.
    pub async fn process_upload(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        selection: &PageSelection,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, IngestError> {
        let this = self.clone();
        let mime_type = mime_type.to_string();
        let selection = selection.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            this.process_upload_blocking(bytes, &mime_type, &selection, &cancel)
        })
        .await
        .map_err(join_error)?
    }

    /// Blocking variant of [`UploadProcessor::process_upload`] for callers
    /// that already run on a worker thread.
    pub fn process_upload_blocking(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        selection: &PageSelection,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, IngestError> {
        let staged = input::stage_bytes(bytes, mime_type)?;
        self.process_staged(&staged, selection, cancel)
    }

    /// Page count and kind of an upload, without rendering any page.
    pub async fn inspect(&self, bytes: Vec<u8>, mime_type: &str) -> Result<DocumentInfo, IngestError> {
        let this = self.clone();
        let mime_type = mime_type.to_string();
        tokio::task::spawn_blocking(move || {
            let staged = input::stage_bytes(bytes, &mime_type)?;
            this.inspect_staged(&staged)
        })
        .await
        .map_err(join_error)?
    }

    /// Process a local PDF or image. The kind comes from `mime_type` when
    /// given, else from the file extension.
    pub async fn process_path(
        &self,
        path: &Path,
        mime_type: Option<&str>,
        selection: &PageSelection,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, IngestError> {
        let this = self.clone();
        let path = path.to_path_buf();
        let mime_type = mime_type.map(str::to_string);
        let selection = selection.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let staged = input::stage_file(&path, mime_type.as_deref())?;
            this.process_staged(&staged, &selection, &cancel)
        })
        .await
        .map_err(join_error)?
    }

    /// Page count and kind of a local file, without rendering.
    pub async fn inspect_path(&self, path: &Path, mime_type: Option<&str>) -> Result<DocumentInfo, IngestError> {
        let this = self.clone();
        let path = path.to_path_buf();
        let mime_type = mime_type.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let staged = input::stage_file(&path, mime_type.as_deref())?;
            this.inspect_staged(&staged)
        })
        .await
        .map_err(join_error)?
    }

    pub(crate) fn inspect_staged(&self, staged: &StagedDocument) -> Result<DocumentInfo, IngestError> {
        let page_count = DocumentSplitter::new(self.rasterizer.as_ref(), &self.config).page_count(staged)?;
        Ok(DocumentInfo {
            kind: staged.kind(),
            page_count,
        })
    }

    /// Process an already staged upload on the current thread.
    pub fn process_staged(
        &self,
        staged: &StagedDocument,
        selection: &PageSelection,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, IngestError> {
        let start = Instant::now();
        let mut pages = Vec::new();
        let mut warnings = Vec::new();

        let summary = self.drive(staged, selection, cancel, |outcome| {
            match outcome {
                Ok(page) => pages.push(page),
                Err(error) => warnings.push(UploadWarning::PageFailed { error }),
            }
            ControlFlow::Continue(())
        })?;

        Ok(assemble_result(
            staged.kind(),
            pages,
            warnings,
            summary.document_pages,
            summary.delivered,
            start,
        ))
    }

    /// Run every selected page through the pipeline, handing each outcome to
    /// `sink` in ascending page order.
    ///
    /// Cancellation is observed before the first page and between pages; a
    /// page that has started always finishes. `sink` returning `Break` stops
    /// quietly (the consumer went away).
    pub(crate) fn drive(
        &self,
        staged: &StagedDocument,
        selection: &PageSelection,
        cancel: &CancellationToken,
        mut sink: impl FnMut(Result<PageResult, PageError>) -> ControlFlow<()>,
    ) -> Result<SplitSummary, IngestError> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled { processed: 0 });
        }

        info!("Processing {} upload", staged.kind());
        let splitter = DocumentSplitter::new(self.rasterizer.as_ref(), &self.config);
        let processor = PageProcessor::new(&self.config);
        let callback = self.config.progress_callback.as_ref();

        let mut started = false;
        let mut succeeded = 0usize;
        let mut cancelled = false;

        let summary = splitter.for_each_page(staged, selection, |split| {
            if !started {
                started = true;
                if let Some(cb) = callback {
                    cb.on_upload_start(split.total);
                }
            }
            if let Some(cb) = callback {
                cb.on_page_start(split.page_number, split.total);
            }

            let outcome = split
                .image
                .and_then(|raster| processor.process(raster, split.page_number));
            match &outcome {
                Ok(page) => {
                    succeeded += 1;
                    if let Some(cb) = callback {
                        cb.on_page_complete(split.page_number, split.total, page.warnings.len());
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    if let Some(cb) = callback {
                        cb.on_page_error(split.page_number, split.total, e.to_string());
                    }
                }
            }

            if sink(outcome).is_break() {
                debug!("Page consumer stopped after page {}", split.page_number);
                return ControlFlow::Break(());
            }
            if cancel.is_cancelled() {
                cancelled = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;

        if cancelled && summary.stopped_early {
            warn!(
                "Processing cancelled after {} of the selected pages",
                summary.delivered
            );
            return Err(IngestError::Cancelled {
                processed: succeeded,
            });
        }

        if let Some(cb) = callback {
            if !started {
                cb.on_upload_start(0);
            }
            cb.on_upload_complete(summary.delivered, succeeded);
        }
        Ok(summary)
    }
}

/// Build the final result, adding the upload-level warning when nothing
/// succeeded.
pub(crate) fn assemble_result(
    kind: DocumentKind,
    pages: Vec<PageResult>,
    mut warnings: Vec<UploadWarning>,
    document_pages: usize,
    attempted_pages: usize,
    start: Instant,
) -> UploadResult {
    if pages.is_empty() {
        warnings.push(UploadWarning::NoPagesProcessed);
    }
    let stats = UploadStats {
        document_pages,
        attempted_pages,
        processed_pages: pages.len(),
        failed_pages: attempted_pages.saturating_sub(pages.len()),
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Upload processed: {}/{} pages ({} in document), {}ms total",
        stats.processed_pages, stats.attempted_pages, stats.document_pages, stats.total_duration_ms
    );
    UploadResult {
        kind,
        pages,
        warnings,
        stats,
    }
}

fn join_error(e: tokio::task::JoinError) -> IngestError {
    IngestError::Internal(format!("processing task failed: {e}"))
}

// ── Free-function conveniences ───────────────────────────────────────────

/// Process upload bytes with pdfium and no cancellation.
///
/// This is the primary entry point for the library. `selected_pages` is the
/// upload's optional page list; `None` or empty means all pages.
///
/// # Example
/// ```rust,no_run
/// use blueprint_ingest::{process_upload, ProcessingConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("A-101.pdf")?;
/// let config = ProcessingConfig::default();
/// let result = process_upload(bytes, "application/pdf", Some(&[1, 3]), &config).await?;
/// for page in &result.pages {
///     println!("page {}: {}x{}", page.page_number, page.width_px, page.height_px);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_upload(
    bytes: Vec<u8>,
    mime_type: &str,
    selected_pages: Option<&[usize]>,
    config: &ProcessingConfig,
) -> Result<UploadResult, IngestError> {
    UploadProcessor::with_pdfium(config.clone())
        .process_upload(
            bytes,
            mime_type,
            &PageSelection::from_pages(selected_pages),
            &CancellationToken::new(),
        )
        .await
}

/// Synchronous wrapper around [`process_upload`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_upload_sync(
    bytes: Vec<u8>,
    mime_type: &str,
    selected_pages: Option<&[usize]>,
    config: &ProcessingConfig,
) -> Result<UploadResult, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_upload(bytes, mime_type, selected_pages, config))
}

/// Process a local PDF or image. The kind is taken from the extension.
pub async fn process_file(
    path: impl AsRef<Path>,
    selection: &PageSelection,
    config: &ProcessingConfig,
) -> Result<UploadResult, IngestError> {
    UploadProcessor::with_pdfium(config.clone())
        .process_path(path.as_ref(), None, selection, &CancellationToken::new())
        .await
}

/// Page count of a local PDF or image without rendering.
pub async fn inspect(path: impl AsRef<Path>) -> Result<DocumentInfo, IngestError> {
    UploadProcessor::with_pdfium(ProcessingConfig::default())
        .inspect_path(path.as_ref(), None)
        .await
}

/// Process a local file and write the artifacts into `out_dir`:
/// `page_NNN.png`, `page_NNN_thumb.jpg` and `manifest.json`.
///
/// Pages are written as they complete, so only one page's bytes are held in
/// memory at a time. Every file is written atomically (temp file + rename).
///
/// # Errors
/// Besides the fatal processing errors (including ones raised after some
/// pages were already written), returns [`IngestError::NoPagesProcessed`]
/// when no page succeeded. The manifest is not written in either case.
pub async fn process_to_dir(
    processor: &UploadProcessor,
    path: impl AsRef<Path>,
    mime_type: Option<&str>,
    out_dir: impl AsRef<Path>,
    selection: &PageSelection,
) -> Result<UploadResult, IngestError> {
    let start = Instant::now();
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| IngestError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let (info, mut stream, worker) = processor
        .stream_file_with_info(path.as_ref(), mime_type, selection)
        .await?;

    let mut pages = Vec::new();
    let mut warnings = Vec::new();
    let mut attempted = 0usize;
    while let Some(item) = stream.next().await {
        attempted += 1;
        match item {
            Ok(mut page) => {
                write_page_files(out_dir, &page).await?;
                page.png = Vec::new();
                page.thumbnail_jpeg = Vec::new();
                pages.push(page);
            }
            Err(error) => warnings.push(UploadWarning::PageFailed { error }),
        }
    }

    // A stream that ended because the worker failed is not a short upload.
    worker
        .await
        .map_err(|_| IngestError::Internal("streaming worker exited without reporting".to_string()))??;

    let result = assemble_result(info.kind, pages, warnings, info.page_count, attempted, start).into_result()?;
    let manifest = serde_json::to_vec_pretty(&result)
        .map_err(|e| IngestError::Internal(format!("manifest serialisation failed: {e}")))?;
    write_atomic(&out_dir.join("manifest.json"), &manifest).await?;
    Ok(result)
}

/// File names used for a page's artifacts.
pub fn page_file_names(page_number: usize) -> (String, String) {
    (
        format!("page_{:03}.png", page_number),
        format!("page_{:03}_thumb.jpg", page_number),
    )
}

/// Write a page's PNG and thumbnail into `out_dir`, returning both paths.
pub async fn write_page_files(out_dir: &Path, page: &PageResult) -> Result<(PathBuf, PathBuf), IngestError> {
    let (png_name, thumb_name) = page_file_names(page.page_number);
    let png_path = out_dir.join(png_name);
    let thumb_path = out_dir.join(thumb_name);
    write_atomic(&png_path, &page.png).await?;
    write_atomic(&thumb_path, &page.thumbnail_jpeg).await?;
    debug!("Wrote page {} to {}", page.page_number, png_path.display());
    Ok((png_path, thumb_path))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    let write_failed = |e| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_file_names_are_zero_padded() {
        assert_eq!(
            page_file_names(7),
            ("page_007.png".to_string(), "page_007_thumb.jpg".to_string())
        );
        assert_eq!(page_file_names(1234).0, "page_1234.png");
    }

    #[test]
    fn empty_result_gets_upload_warning() {
        let result = assemble_result(DocumentKind::Pdf, vec![], vec![], 3, 0, Instant::now());
        assert_eq!(result.warnings, vec![UploadWarning::NoPagesProcessed]);
        assert_eq!(result.stats.document_pages, 3);
        assert!(result.is_failed());
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("page_001.png");
        write_atomic(&target, b"abc").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
        assert!(!dir.path().join("page_001.png.tmp").exists());
    }
}
