//! Error types for the dwani-client library.
//!
//! Four error families map onto four distinct recovery policies:
//!
//! * [`ValidationError`]: bad file type, missing prompt, bad page number.
//!   Blocks submission before anything touches the network and is shown
//!   inline next to the input that caused it.
//!
//! * [`FetchError`]: the Retrying Fetcher gave up (every attempt failed at
//!   the transport or returned a non-success status) or the sequence was
//!   cancelled by a newer user action. Exhaustion is surfaced as a
//!   retryable banner; cancellation is silent.
//!
//! * [`PreviewError`]: pdfium could not decode or rasterise a document.
//!   Always recovered locally: the caller logs it and shows
//!   "preview unavailable" while the textual result still displays.
//!
//! * [`DwaniError`]: fatal library errors (configuration, I/O, a response
//!   body that does not match the expected shape).
//!
//! Malformed tool-claim JSON never produces an error value at all; the
//! parser in [`crate::tools`] absorbs it into an `Error` label.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the dwani-client library.
#[derive(Debug, Error)]
pub enum DwaniError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file was staged but rejected before submission.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Network errors ────────────────────────────────────────────────────
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The service answered with a success status but the body was not the
    /// shape the caller expected.
    #[error("Unexpected response from '{endpoint}': {detail}")]
    InvalidResponse { endpoint: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rejections raised before a request is built.
///
/// The display strings are the exact copy shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The staged file is not a PDF.
    #[error("Please select a valid PDF file.")]
    NotAPdf { mime_type: String },

    /// `submit()` was called with nothing staged.
    #[error("Please upload a PDF file first.")]
    NoFile,

    /// The flow needs a prompt and the prompt is blank.
    #[error("Please enter a prompt.")]
    PromptRequired,

    /// Pages are 1-indexed.
    #[error("Page number must be at least 1.")]
    InvalidPageNumber { page: usize },
}

/// Outcome of a Retrying Fetcher sequence that did not produce a response.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Every attempt failed; carries the last status and body seen.
    #[error("{0}")]
    Exhausted(FetchFailure),

    /// A newer action superseded this sequence before it finished.
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// The HTTP status of the final attempt, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Exhausted(f) => f.status,
            FetchError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// The final failed attempt of an exhausted retry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub endpoint: String,
    pub attempts: u32,
    /// `None` when the transport failed before a status line arrived.
    pub status: Option<u16>,
    /// Response body text, or the transport error message.
    pub body: String,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "HTTP {status} from '{}' after {} attempt(s): {}",
                self.endpoint, self.attempts, self.body
            ),
            None => write!(
                f,
                "request to '{}' failed after {} attempt(s): {}",
                self.endpoint, self.attempts, self.body
            ),
        }
    }
}

/// A failed PDF decode or rasterisation (the "DecodeError" of the preview
/// renderer). Never fatal.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to load pdfium runtime: {0}")]
    Binding(String),

    #[error("failed to decode PDF document: {0}")]
    Document(String),

    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("failed to render page {page}: {detail}")]
    Render { page: usize, detail: String },

    #[error("failed to encode page {page} as PNG: {source}")]
    Encode {
        page: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("preview task panicked: {0}")]
    TaskPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_match_product_copy() {
        let e = ValidationError::NotAPdf {
            mime_type: "image/png".into(),
        };
        assert_eq!(e.to_string(), "Please select a valid PDF file.");
        assert_eq!(ValidationError::NoFile.to_string(), "Please upload a PDF file first.");
        assert_eq!(ValidationError::PromptRequired.to_string(), "Please enter a prompt.");
    }

    #[test]
    fn exhausted_display_with_status() {
        let e = FetchError::Exhausted(FetchFailure {
            endpoint: "/v1/user-captures/".into(),
            attempts: 4,
            status: Some(503),
            body: "upstream down".into(),
        });
        let msg = e.to_string();
        assert!(msg.contains("HTTP 503"), "got: {msg}");
        assert!(msg.contains("4 attempt"), "got: {msg}");
        assert!(msg.contains("upstream down"), "got: {msg}");
        assert_eq!(e.status(), Some(503));
    }

    #[test]
    fn exhausted_display_without_status() {
        let e = FetchError::Exhausted(FetchFailure {
            endpoint: "/v1/x".into(),
            attempts: 1,
            status: None,
            body: "connection refused".into(),
        });
        assert!(e.to_string().contains("connection refused"));
        assert_eq!(e.status(), None);
        assert!(!e.is_cancelled());
    }

    #[test]
    fn validation_converts_into_fatal() {
        let e: DwaniError = ValidationError::PromptRequired.into();
        assert_eq!(e.to_string(), "Please enter a prompt.");
    }
}
