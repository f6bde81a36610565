//! Upload lifecycle: `UPLOADED → PROCESSING → {READY, FAILED}`.
//!
//! The status only ever moves forward. [`UploadRecord`] owns the transition
//! rules so a collaborator cannot accidentally resurrect a terminal upload;
//! the selected page list lives on the record itself instead of being
//! recovered from the human-readable progress trail.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an upload as seen by the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl UploadStatus {
    /// `READY` and `FAILED` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Ready | UploadStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing) | (Uploaded, Failed) | (Processing, Ready) | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Ready => "READY",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse progress steps recorded on the upload while the task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Queued,
    Fetching,
    Converting,
    UploadingPages,
    Done,
}

/// The per-upload record a collaborator persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    pub mime_type: String,
    /// 1-based pages to process; `None` or empty means all pages.
    pub selected_pages: Option<Vec<usize>>,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    /// Page-level and upload-level warnings, rendered for display.
    pub warnings: Vec<String>,
    pub page_count: usize,
    pub progress: Vec<ProcessingStage>,
}

impl UploadRecord {
    /// A freshly accepted upload in `UPLOADED` state.
    pub fn new(id: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            selected_pages: None,
            status: UploadStatus::Uploaded,
            error_message: None,
            warnings: Vec::new(),
            page_count: 0,
            progress: vec![ProcessingStage::Queued],
        }
    }

    pub fn with_selected_pages(mut self, pages: Vec<usize>) -> Self {
        self.selected_pages = if pages.is_empty() { None } else { Some(pages) };
        self
    }

    /// Enter `PROCESSING`.
    ///
    /// A record already in `PROCESSING` is restarted in place (the previous
    /// worker died mid-task and the queue redelivered it). Terminal records
    /// are rejected.
    pub fn begin_processing(&mut self) -> Result<(), IngestError> {
        match self.status {
            UploadStatus::Processing => {
                self.progress.clear();
                self.progress.push(ProcessingStage::Queued);
                Ok(())
            }
            _ => self.transition(UploadStatus::Processing),
        }
    }

    /// Enter `READY` with the final page count and warnings.
    pub fn mark_ready(&mut self, page_count: usize, warnings: Vec<String>) -> Result<(), IngestError> {
        self.transition(UploadStatus::Ready)?;
        self.page_count = page_count;
        self.warnings = warnings;
        self.error_message = None;
        self.record_stage(ProcessingStage::Done);
        Ok(())
    }

    /// Enter `FAILED`, keeping whatever warnings were collected so far.
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        warnings: Vec<String>,
    ) -> Result<(), IngestError> {
        self.transition(UploadStatus::Failed)?;
        self.error_message = Some(message.into());
        self.warnings = warnings;
        self.page_count = 0;
        Ok(())
    }

    pub fn record_stage(&mut self, stage: ProcessingStage) {
        if self.progress.last() != Some(&stage) {
            self.progress.push(stage);
        }
    }

    fn transition(&mut self, next: UploadStatus) -> Result<(), IngestError> {
        if !self.status.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_monotonic() {
        let mut record = UploadRecord::new("u1", "application/pdf");
        record.begin_processing().unwrap();
        assert_eq!(record.status, UploadStatus::Processing);
        record.mark_ready(3, vec!["Page 2: Image may be blurry (score: 12.0)".into()]).unwrap();
        assert_eq!(record.status, UploadStatus::Ready);
        assert_eq!(record.page_count, 3);
        assert_eq!(record.progress.last(), Some(&ProcessingStage::Done));
    }

    #[test]
    fn terminal_states_reject_processing() {
        let mut record = UploadRecord::new("u1", "image/png");
        record.begin_processing().unwrap();
        record.mark_failed("No pages processed", vec![]).unwrap();
        let err = record.begin_processing().unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidTransition {
                from: UploadStatus::Failed,
                to: UploadStatus::Processing
            }
        ));
        assert!(record.mark_ready(1, vec![]).is_err());
        assert_eq!(record.status, UploadStatus::Failed);
    }

    #[test]
    fn ready_requires_processing_first() {
        let mut record = UploadRecord::new("u1", "image/png");
        assert!(record.mark_ready(1, vec![]).is_err());
        assert_eq!(record.status, UploadStatus::Uploaded);
    }

    #[test]
    fn redelivered_processing_record_restarts() {
        let mut record = UploadRecord::new("u1", "application/pdf");
        record.begin_processing().unwrap();
        record.record_stage(ProcessingStage::Converting);
        record.begin_processing().unwrap();
        assert_eq!(record.status, UploadStatus::Processing);
        assert_eq!(record.progress, vec![ProcessingStage::Queued]);
    }

    #[test]
    fn empty_selection_means_all_pages() {
        let record = UploadRecord::new("u1", "application/pdf").with_selected_pages(vec![]);
        assert!(record.selected_pages.is_none());
    }

    #[test]
    fn status_serialises_uppercase() {
        let json = serde_json::to_string(&UploadStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        let stage = serde_json::to_string(&ProcessingStage::UploadingPages).unwrap();
        assert_eq!(stage, "\"uploading_pages\"");
    }
}
