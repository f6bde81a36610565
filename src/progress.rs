//! Progress-callback trait for per-page processing events.
//!
//! Inject an [`Arc<dyn ProcessingProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through an upload. Callers can forward them
//! to a progress bar, a job-status table or a log without the library knowing
//! how the host application reports progress.
//!
//! # Example
//!
//! ```rust
//! use blueprint_ingest::{ProcessingConfig, ProcessingProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_number: usize, total_pages: usize, warnings: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page_number}/{total_pages} done ({warnings} warnings)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ProcessingProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// Pages of one upload are processed sequentially, but a callback shared
/// between uploads may be invoked from several blocking threads at once,
/// hence `Send + Sync`. All methods default to no-ops.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once, after the page count probe, before the first page is rendered.
    ///
    /// # Arguments
    /// * `total_pages`: number of pages that will be attempted
    fn on_upload_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been rendered or decoded, before its pipeline runs.
    fn on_page_start(&self, page_number: usize, total_pages: usize) {
        let _ = (page_number, total_pages);
    }

    /// Called when a page produced a [`crate::output::PageResult`].
    ///
    /// # Arguments
    /// * `page_number`: 1-indexed page number
    /// * `total_pages`: pages being attempted
    /// * `warnings`: number of quality warnings attached to the page
    fn on_page_complete(&self, page_number: usize, total_pages: usize, warnings: usize) {
        let _ = (page_number, total_pages, warnings);
    }

    /// Called when a page was skipped because it could not be rendered,
    /// decoded or encoded.
    fn on_page_error(&self, page_number: usize, total_pages: usize, error: String) {
        let _ = (page_number, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    ///
    /// # Arguments
    /// * `total_pages`: pages attempted
    /// * `success_count`: pages that produced a result
    fn on_upload_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl ProcessingProgressCallback for TrackingCallback {
        fn on_upload_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_number: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_number: usize, _total_pages: usize, _warnings: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_number: usize, _total_pages: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_upload_complete(&self, _total_pages: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_upload_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 2);
        cb.on_page_error(2, 5, "truncated JPEG".into());
        cb.on_upload_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_upload_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_page_start(1, 3);
        tracker.on_page_complete(1, 3, 0);
        tracker.on_page_start(2, 3);
        tracker.on_page_complete(2, 3, 1);
        tracker.on_page_error(3, 3, "render failed".into());

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_upload_complete(3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }
}
