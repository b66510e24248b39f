//! Error types for the cv-reformatter library.
//!
//! Errors are split by how far they reach:
//!
//! * [`ReformatError`]: **fatal** for the operation that raised it. Raised when the
//!   configuration is invalid, an input file cannot be read, the HTTP client
//!   cannot be built, or an export could not be written.
//!
//! * [`PreviewError`]: **non-fatal**, scoped to one upload slot. Stored in
//!   [`crate::slot::PreviewState::Failed`]; it never blocks other slots, the
//!   wizard step, or submission.
//!
//! * [`SubmitError`]: the outcome of a rejected or failed submission. A
//!   failed submission leaves every slot intact so the same files can be
//!   resubmitted.
//!
//! [`ServiceError`] is what the reformat collaborator reports; the
//! coordinator folds it into [`SubmitError::SubmissionFailed`].

use crate::slot::SlotName;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by configuration, file loading and export.
#[derive(Debug, Error)]
pub enum ReformatError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed part-way.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A slot name outside `cv`, `template`, `example`.
    #[error("Unknown upload slot '{name}' (expected cv, template or example)")]
    UnknownSlot { name: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The HTTP client for the reformat service could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported document.
    #[error("Failed to write output file '{path}': {source}")]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal preview failure for a single slot.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PreviewError {
    /// The media type is not PDF, Word-processor or Presentation.
    #[error("Unsupported file type '{media_type}'")]
    UnsupportedFormat { media_type: String },

    /// The container could not be opened or is missing a required part.
    #[error("Document is corrupt: {detail}")]
    CorruptDocument { detail: String },

    /// The container opened but its content could not be decoded or rendered.
    #[error("Could not decode document: {detail}")]
    DecodeFailure { detail: String },
}

impl PreviewError {
    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        PreviewError::CorruptDocument {
            detail: detail.into(),
        }
    }

    pub(crate) fn decode(detail: impl Into<String>) -> Self {
        PreviewError::DecodeFailure {
            detail: detail.into(),
        }
    }
}

/// Why a submission was rejected or did not produce a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// A required slot is empty; no request was made.
    #[error("Please select both CV and template files (missing: {})", join_slots(.missing))]
    IncompleteInput { missing: Vec<SlotName> },

    /// Another submission is still pending.
    #[error("A submission is already in progress")]
    SubmissionInProgress,

    /// The reformat call failed (transport, status, or body).
    #[error("Reformatting failed: {detail}")]
    SubmissionFailed { detail: String },
}

fn join_slots(slots: &[SlotName]) -> String {
    slots
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure reported by a [`crate::service::ReformatService`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// A success status whose body lacks the reformatted text.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl From<ServiceError> for SubmitError {
    fn from(e: ServiceError) -> Self {
        SubmitError::SubmissionFailed {
            detail: e.to_string(),
        }
    }
}
