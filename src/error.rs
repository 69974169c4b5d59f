//! Error types for the illuminate library.
//!
//! Every failure is fatal to the current run. The pipeline never degrades
//! silently: it stops at the first failing unit and reports which stage and
//! page it was working on. Artifacts produced before the failure stay on disk,
//! so re-running the same job resumes past them.
//!
//! Collaborator implementations ([`crate::pipeline`]) return a [`BoxError`];
//! the stage runner wraps it into [`IlluminateError::Collaborator`] together
//! with the stage and page index.

use crate::job::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by collaborator traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors returned by the illuminate library.
#[derive(Debug, Error)]
pub enum IlluminateError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("Source document not found: '{path}'\nCheck the path exists and is a file.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source document.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Source path does not carry the `.pdf` extension.
    #[error("Source document '{path}' has extension '{extension}', expected '.pdf'")]
    InvalidExtension { path: PathBuf, extension: String },

    /// The file has a `.pdf` extension but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Collaborator errors ───────────────────────────────────────────────
    /// An external collaborator (rasterizer, OCR engine, translator,
    /// enhancer, assembler) failed.
    #[error("{stage} failed{}: {source}", page_suffix(.page))]
    Collaborator {
        stage: Stage,
        page: Option<usize>,
        #[source]
        source: BoxError,
    },

    /// The translation provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Encoding errors ───────────────────────────────────────────────────
    /// A transcript could not be decoded, or its text cannot be represented
    /// in the encoding of the original-language master.
    #[error("Encoding error on page {page} ('{path}'): {detail}")]
    Encoding {
        page: usize,
        path: PathBuf,
        detail: String,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A delegate reported success but no artifact was written.
    #[error("{stage} produced no artifact for page {page} (expected '{path}')")]
    MissingArtifact {
        stage: Stage,
        page: usize,
        path: PathBuf,
    },

    /// A stage barrier was violated: some units have no artifact.
    #[error("{stage} is incomplete: {} page(s) missing, first missing page {}", .missing.len(), .missing.first().copied().unwrap_or_default())]
    IncompleteStage { stage: Stage, missing: Vec<usize> },

    /// The run was cancelled before the given unit started.
    #[error("{stage} cancelled before page {page}")]
    Cancelled { stage: Stage, page: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a job artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn page_suffix(page: &Option<usize>) -> String {
    page.map(|p| format!(" on page {p}")).unwrap_or_default()
}

impl IlluminateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors detected before any stage starts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::InvalidExtension { .. }
                | Self::NotAPdf { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// The stage the failure occurred in, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Collaborator { stage, .. }
            | Self::MissingArtifact { stage, .. }
            | Self::IncompleteStage { stage, .. }
            | Self::Cancelled { stage, .. } => Some(*stage),
            Self::Encoding { .. } => Some(Stage::Translate),
            _ => None,
        }
    }

    /// The page index the failure occurred on, when known.
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::Collaborator { page, .. } => *page,
            Self::MissingArtifact { page, .. }
            | Self::Cancelled { page, .. }
            | Self::Encoding { page, .. } => Some(*page),
            Self::IncompleteStage { missing, .. } => missing.first().copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_display_names_stage_and_page() {
        let e = IlluminateError::Collaborator {
            stage: Stage::Transcribe,
            page: Some(7),
            source: "tesseract exited with status 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("transcribe"), "got: {msg}");
        assert!(msg.contains("page 7"), "got: {msg}");
        assert!(msg.contains("status 1"), "got: {msg}");
        assert_eq!(e.stage(), Some(Stage::Transcribe));
        assert_eq!(e.page(), Some(7));
    }

    #[test]
    fn collaborator_display_without_page() {
        let e = IlluminateError::Collaborator {
            stage: Stage::Scan,
            page: None,
            source: "cannot open document".into(),
        };
        assert_eq!(e.to_string(), "scan failed: cannot open document");
    }

    #[test]
    fn incomplete_stage_display() {
        let e = IlluminateError::IncompleteStage {
            stage: Stage::Enhance,
            missing: vec![4, 9],
        };
        let msg = e.to_string();
        assert!(msg.contains("2 page(s) missing"), "got: {msg}");
        assert!(msg.contains("first missing page 4"), "got: {msg}");
        assert_eq!(e.page(), Some(4));
    }

    #[test]
    fn validation_classification() {
        assert!(IlluminateError::SourceNotFound {
            path: "book.pdf".into()
        }
        .is_validation());
        assert!(IlluminateError::InvalidConfig("x".into()).is_validation());
        assert!(!IlluminateError::Cancelled {
            stage: Stage::Scan,
            page: 0
        }
        .is_validation());
    }

    #[test]
    fn encoding_error_reports_translate_stage() {
        let e = IlluminateError::Encoding {
            page: 2,
            path: "2.txt".into(),
            detail: "malformed".into(),
        };
        assert_eq!(e.stage(), Some(Stage::Translate));
        assert_eq!(e.page(), Some(2));
    }
}
