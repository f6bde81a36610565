//! The orchestration boundary: one upload record in, READY or FAILED out.
//!
//! [`run_upload_task`] is what a queue worker calls for each delivered
//! upload id. It owns the status transitions and guarantees the record
//! never stays in `PROCESSING`: every error, cancellation, or panic inside
//! the pipeline is turned into `FAILED` with a human-readable message.
//!
//! Storage is injected through [`UploadStore`] so the task can run against
//! an object store and relational store in production and an in-memory
//! fake in tests.

use crate::config::PageSelection;
use crate::error::{IngestError, StorageError};
use crate::output::PageResult;
use crate::process::UploadProcessor;
use crate::status::{ProcessingStage, UploadRecord, UploadStatus};
use async_trait::async_trait;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Persistence collaborator for the upload task.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Fetch the original uploaded bytes.
    async fn fetch_original(&self, upload_id: &str) -> Result<Vec<u8>, StorageError>;

    /// Persist one processed page (PNG, thumbnail, dimensions, warnings).
    /// Called in ascending page order.
    async fn store_page(&self, upload_id: &str, page: &PageResult) -> Result<(), StorageError>;

    /// Persist the upload record (status, warnings, progress).
    async fn save_record(&self, record: &UploadRecord) -> Result<(), StorageError>;
}

/// Process one upload end to end and return its final status.
///
/// A record that is already terminal (a redelivered message) is returned
/// untouched. Otherwise the record is moved to `PROCESSING`, the original is
/// fetched and processed, every successful page is stored in ascending
/// order, and the record ends in `READY` (at least one page) or `FAILED`.
pub async fn run_upload_task<S: UploadStore + ?Sized>(
    record: &mut UploadRecord,
    store: &S,
    processor: &UploadProcessor,
    cancel: &CancellationToken,
) -> UploadStatus {
    if record.status.is_terminal() {
        info!(
            "Upload {} is already {}; skipping redelivered task",
            record.id, record.status
        );
        return record.status;
    }

    let start = Instant::now();
    if let Err(e) = record.begin_processing() {
        error!("Upload {}: {}", record.id, e);
        return record.status;
    }
    info!("Upload {} processing started ({})", record.id, record.mime_type);

    let (message, warnings) = match process_record(record, store, processor, cancel).await {
        Ok(()) => {
            info!(
                "Upload {} is {} with {} page(s) in {}ms",
                record.id,
                record.status,
                record.page_count,
                start.elapsed().as_millis()
            );
            return record.status;
        }
        Err(Failure { message, warnings }) => (message, warnings),
    };

    error!("Upload {} failed: {}", record.id, message);
    if let Err(e) = record.mark_failed(message, warnings) {
        error!("Upload {}: {}", record.id, e);
    }
    save_final(record, store).await;
    record.status
}

struct Failure {
    message: String,
    warnings: Vec<String>,
}

impl From<IngestError> for Failure {
    fn from(e: IngestError) -> Self {
        Failure {
            message: e.to_string(),
            warnings: Vec::new(),
        }
    }
}

async fn process_record<S: UploadStore + ?Sized>(
    record: &mut UploadRecord,
    store: &S,
    processor: &UploadProcessor,
    cancel: &CancellationToken,
) -> Result<(), Failure> {
    store.save_record(record).await.map_err(IngestError::from)?;

    record.record_stage(ProcessingStage::Fetching);
    let bytes = store
        .fetch_original(&record.id)
        .await
        .map_err(IngestError::from)?;
    debug!("Upload {}: fetched {} bytes", record.id, bytes.len());

    record.record_stage(ProcessingStage::Converting);
    let selection = PageSelection::from_pages(record.selected_pages.as_deref());
    let result = processor
        .process_upload(bytes, &record.mime_type, &selection, cancel)
        .await?;

    let warnings = result.all_warnings();
    if result.is_failed() {
        return Err(Failure {
            message: result.no_pages_error().to_string(),
            warnings,
        });
    }

    record.record_stage(ProcessingStage::UploadingPages);
    for (stored, page) in result.pages.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("Upload {}: cancelled while storing pages", record.id);
            return Err(Failure {
                message: IngestError::Cancelled { processed: stored }.to_string(),
                warnings,
            });
        }
        if let Err(e) = store.store_page(&record.id, page).await {
            return Err(Failure {
                message: IngestError::from(e).to_string(),
                warnings,
            });
        }
    }

    record
        .mark_ready(result.pages.len(), warnings)
        .map_err(Failure::from)?;
    save_final(record, store).await;
    Ok(())
}

async fn save_final<S: UploadStore + ?Sized>(record: &UploadRecord, store: &S) {
    if let Err(e) = store.save_record(record).await {
        error!(
            "Upload {}: could not persist final status {}: {}",
            record.id, record.status, e
        );
    }
}
