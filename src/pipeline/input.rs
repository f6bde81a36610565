//! Input staging: classify the declared MIME type and give the upload its
//! own scoped working area.
//!
//! ## Why spool PDFs to a temp file?
//!
//! pdfium loads a document lazily from a file path, reading objects on demand
//! as each page is rendered. Spooling the upload to a `TempDir` lets the
//! original byte buffer be dropped before rendering starts, and the directory
//! is removed when [`StagedDocument`] is dropped on every exit path, panics
//! included. Raster uploads are a single page and are decoded from memory.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Upload types accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
    Heic,
}

impl DocumentKind {
    /// Classify a declared MIME type. Parameters (`; charset=…`) and case are
    /// ignored.
    pub fn from_mime(mime_type: &str) -> Result<Self, IngestError> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(DocumentKind::Pdf),
            "image/png" => Ok(DocumentKind::Png),
            "image/jpeg" | "image/jpg" => Ok(DocumentKind::Jpeg),
            "image/heic" | "image/heif" => Ok(DocumentKind::Heic),
            _ => Err(IngestError::UnsupportedFormat {
                mime_type: mime_type.to_string(),
            }),
        }
    }

    /// Guess the kind of a local file from its extension.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "png" => Ok(DocumentKind::Png),
            "jpg" | "jpeg" => Ok(DocumentKind::Jpeg),
            "heic" | "heif" => Ok(DocumentKind::Heic),
            _ => Err(IngestError::UnsupportedFormat {
                mime_type: format!("unknown (extension '.{ext}')"),
            }),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Heic => "image/heic",
        }
    }

    pub fn is_pdf(self) -> bool {
        self == DocumentKind::Pdf
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// An upload ready for the splitter.
pub enum StagedDocument {
    /// A PDF on disk. `_work_dir` is `Some` when the bytes were spooled by us
    /// and keeps the directory alive until processing completes.
    Pdf {
        path: PathBuf,
        _work_dir: Option<TempDir>,
    },
    /// A single raster image held in memory.
    Image { kind: DocumentKind, bytes: Vec<u8> },
}

impl StagedDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            StagedDocument::Pdf { .. } => DocumentKind::Pdf,
            StagedDocument::Image { kind, .. } => *kind,
        }
    }
}

/// Stage in-memory upload bytes.
///
/// Fails with [`IngestError::UnsupportedFormat`] before any work is done when
/// the MIME type is not allowed.
pub fn stage_bytes(bytes: Vec<u8>, mime_type: &str) -> Result<StagedDocument, IngestError> {
    let kind = DocumentKind::from_mime(mime_type)?;
    if !kind.is_pdf() {
        return Ok(StagedDocument::Image { kind, bytes });
    }

    let work_dir = tempfile::Builder::new()
        .prefix("blueprint-ingest-")
        .tempdir()
        .map_err(|e| IngestError::Internal(format!("Failed to create work dir: {e}")))?;
    let path = work_dir.path().join("source.pdf");
    check_pdf_magic(&bytes, &path)?;
    std::fs::write(&path, &bytes).map_err(|e| IngestError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    })?;
    debug!("Spooled {} PDF bytes to {}", bytes.len(), path.display());

    Ok(StagedDocument::Pdf {
        path,
        _work_dir: Some(work_dir),
    })
}

/// Stage a local file, using its extension unless `mime_type` is given.
pub fn stage_file(path: &Path, mime_type: Option<&str>) -> Result<StagedDocument, IngestError> {
    let kind = match mime_type {
        Some(m) => DocumentKind::from_mime(m)?,
        None => DocumentKind::from_path(path)?,
    };

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };

    if !kind.is_pdf() {
        return Ok(StagedDocument::Image { kind, bytes });
    }
    check_pdf_magic(&bytes, path)?;
    debug!("Resolved local PDF: {}", path.display());
    Ok(StagedDocument::Pdf {
        path: path.to_path_buf(),
        _work_dir: None,
    })
}

fn check_pdf_magic(bytes: &[u8], path: &Path) -> Result<(), IngestError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(IngestError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_allow_list() {
        assert_eq!(DocumentKind::from_mime("application/pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_mime("image/PNG").unwrap(), DocumentKind::Png);
        assert_eq!(DocumentKind::from_mime("image/jpg").unwrap(), DocumentKind::Jpeg);
        assert_eq!(
            DocumentKind::from_mime("image/jpeg; q=0.9").unwrap(),
            DocumentKind::Jpeg
        );
        assert_eq!(DocumentKind::from_mime("image/heic").unwrap(), DocumentKind::Heic);
    }

    #[test]
    fn unsupported_mime_rejected() {
        for m in ["text/plain", "image/gif", "", "application/zip"] {
            assert!(
                matches!(
                    DocumentKind::from_mime(m),
                    Err(IngestError::UnsupportedFormat { .. })
                ),
                "{m}"
            );
        }
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("sheet.PDF")).unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("a/b/photo.jpeg")).unwrap(),
            DocumentKind::Jpeg
        );
        assert!(DocumentKind::from_path(Path::new("notes.txt")).is_err());
    }

    #[test]
    fn staged_pdf_work_dir_removed_on_drop() {
        let staged = stage_bytes(b"%PDF-1.7\n%%EOF".to_vec(), "application/pdf").unwrap();
        let dir = match &staged {
            StagedDocument::Pdf { path, .. } => {
                assert!(path.exists());
                path.parent().unwrap().to_path_buf()
            }
            StagedDocument::Image { .. } => panic!("expected a PDF"),
        };
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn pdf_magic_checked() {
        let err = stage_bytes(b"\x89PNG....".to_vec(), "application/pdf")
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::NotAPdf { magic, .. } if &magic == b"\x89PNG"));
    }

    #[test]
    fn images_stay_in_memory() {
        let staged = stage_bytes(vec![1, 2, 3], "image/png").unwrap();
        assert_eq!(staged.kind(), DocumentKind::Png);
        assert!(matches!(staged, StagedDocument::Image { ref bytes, .. } if bytes.len() == 3));
    }

    #[test]
    fn missing_file_reported() {
        let err = stage_file(Path::new("/definitely/not/here.pdf"), None)
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }
}
