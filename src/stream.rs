//! Streaming processing API: emit pages as they complete.
//!
//! ## Why stream?
//!
//! Drawing sets run to dozens of large sheets. A stream lets the caller
//! persist each page as soon as it is ready and wire up progress, instead of
//! buffering every PNG of the upload in memory.
//!
//! Unlike the eager [`crate::UploadProcessor::process_upload`], which
//! returns only after all pages finish, [`UploadProcessor::stream_pages`]
//! yields one `Result<PageResult, PageError>` per selected page, in
//! ascending page order. The worker renders at most one page ahead of the
//! consumer (channel capacity 1); dropping the stream stops rendering at the
//! next page boundary.

use crate::config::PageSelection;
use crate::error::{IngestError, PageError};
use crate::output::{DocumentInfo, PageResult};
use crate::pipeline::input::{self, StagedDocument};
use crate::process::UploadProcessor;
use std::ops::ControlFlow;
use std::path::Path;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageResult, PageError>> + Send>>;

/// Resolves once the streaming worker stops, with the fatal error that
/// stopped it, if any. Dropped senders (a panicked worker) read as `RecvError`.
pub(crate) type WorkerOutcome = oneshot::Receiver<Result<(), IngestError>>;

impl UploadProcessor {
    /// Process upload bytes, streaming pages as they are ready.
    ///
    /// # Returns
    /// - `Ok(PageStream)`: a stream of `Result<PageResult, PageError>`
    /// - `Err(IngestError)`: fatal error found before the first page
    ///   (unsupported type, unreadable PDF, wrong password, …)
    ///
    /// # Example
    /// ```rust,no_run
    /// use blueprint_ingest::{PageSelection, ProcessingConfig, UploadProcessor};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let processor = UploadProcessor::with_pdfium(ProcessingConfig::default());
    /// let bytes = std::fs::read("S-201.pdf")?;
    /// let mut pages = processor
    ///     .stream_pages(bytes, "application/pdf", &PageSelection::All)
    ///     .await?;
    /// while let Some(page) = pages.next().await {
    ///     match page {
    ///         Ok(p) => println!("page {} ready ({} bytes)", p.page_number, p.png.len()),
    ///         Err(e) => eprintln!("{e}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stream_pages(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        selection: &PageSelection,
    ) -> Result<PageStream, IngestError> {
        let mime_type = mime_type.to_string();
        let staged = tokio::task::spawn_blocking(move || input::stage_bytes(bytes, &mime_type))
            .await
            .map_err(|e| IngestError::Internal(format!("staging task failed: {e}")))??;
        let (_, stream, _) = self.stream_staged(staged, selection).await?;
        Ok(stream)
    }

    /// Stream the pages of a local PDF or image. The kind comes from
    /// `mime_type` when given, else from the file extension.
    pub async fn stream_file(
        &self,
        path: &Path,
        mime_type: Option<&str>,
        selection: &PageSelection,
    ) -> Result<PageStream, IngestError> {
        let (_, stream, _) = self.stream_file_with_info(path, mime_type, selection).await?;
        Ok(stream)
    }

    pub(crate) async fn stream_file_with_info(
        &self,
        path: &Path,
        mime_type: Option<&str>,
        selection: &PageSelection,
    ) -> Result<(DocumentInfo, PageStream, WorkerOutcome), IngestError> {
        let path = path.to_path_buf();
        let mime_type = mime_type.map(str::to_string);
        let staged = tokio::task::spawn_blocking(move || input::stage_file(&path, mime_type.as_deref()))
            .await
            .map_err(|e| IngestError::Internal(format!("staging task failed: {e}")))??;
        self.stream_staged(staged, selection).await
    }

    /// Probe the document, then hand it to a blocking worker that feeds the
    /// returned stream. The worker owns the staged document, so its working
    /// area lives exactly as long as the stream needs it.
    ///
    /// A fatal error after the probe (the document failing to reopen, say)
    /// ends the stream early; it is reported through the [`WorkerOutcome`].
    async fn stream_staged(
        &self,
        staged: StagedDocument,
        selection: &PageSelection,
    ) -> Result<(DocumentInfo, PageStream, WorkerOutcome), IngestError> {
        // Probe first so fatal errors surface as `Err` rather than as an
        // empty stream.
        let this = self.clone();
        let (staged, info) = tokio::task::spawn_blocking(move || {
            let info = this.inspect_staged(&staged)?;
            Ok::<_, IngestError>((staged, info))
        })
        .await
        .map_err(|e| IngestError::Internal(format!("probe task failed: {e}")))??;
        info!("Streaming {} upload with {} pages", info.kind, info.page_count);

        let (tx, rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let this = self.clone();
        let selection = selection.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = this
                .drive(&staged, &selection, &CancellationToken::new(), |page| {
                    match tx.blocking_send(page) {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                })
                .map(|_| ());
            if let Err(e) = &outcome {
                error!("Streaming worker stopped: {}", e);
            }
            // Nobody listening is fine: plain stream consumers only get the log.
            let _ = done_tx.send(outcome);
        });

        Ok((info, Box::pin(ReceiverStream::new(rx)), done_rx))
    }
}
