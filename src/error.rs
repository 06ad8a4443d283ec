//! Error types for the invoice2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the batch cannot proceed at all (input
//!   folder missing, provider not configured, invalid configuration).
//!   Returned as `Err(ExtractError)` from the top-level entry points.
//!
//! * [`DocumentError`] — **Non-fatal**: a single invoice failed (unreadable
//!   file, corrupt PDF, backend returning garbage) but every other invoice
//!   in the batch is fine. Stored inside [`crate::batch::DocumentOutcome`]
//!   so callers can inspect partial success rather than losing the whole
//!   batch to one bad file.
//!
//! VAT verdicts such as `ServiceUnavailable` or `NotFound` are *not* errors
//! — they are valid terminal classifications carried by
//! [`crate::vat::VatVerdict`] and never appear here.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice2json library.
///
/// Per-document failures use [`DocumentError`] and are stored in
/// [`crate::batch::DocumentOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input folder was not found or is not a directory.
    #[error("Input folder not found: '{path}'\nCheck the path exists and is a directory.")]
    FolderNotFound { path: PathBuf },

    /// Input file was not found at the given path.
    #[error("Invoice file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The extraction backend returned an error for a single call.
    #[error("Extraction call failed: {detail}")]
    ExtractionFailure { detail: String },

    /// The backend responded, but the text was not the expected JSON object.
    ///
    /// `raw` retains the offending response verbatim for diagnosis.
    #[error("Malformed extraction response: {detail}")]
    MalformedResponse { detail: String, raw: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single invoice document.
///
/// Stored in [`crate::batch::DocumentOutcome`] when a document fails.
/// The overall batch continues regardless.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// File extension is not one of the supported set.
    #[error("'{file}': unsupported format '{extension}'")]
    UnsupportedFormat { file: String, extension: String },

    /// The file was read but could not be decoded or rendered.
    #[error("'{file}': document corrupt: {detail}")]
    DocumentCorrupt { file: String, detail: String },

    /// The file could not be read at all.
    #[error("'{file}': read failed: {detail}")]
    Io { file: String, detail: String },

    /// Extraction backend call failed after all retries.
    #[error("'{file}': extraction failed after {retries} retries: {detail}")]
    ExtractionFailure {
        file: String,
        retries: u32,
        detail: String,
    },

    /// Backend text violated the JSON schema contract.
    ///
    /// `raw` retains the response verbatim — the single most useful datum
    /// when diagnosing a misbehaving model.
    #[error("'{file}': malformed response: {detail}")]
    MalformedResponse {
        file: String,
        detail: String,
        raw: String,
    },

    /// The record was extracted but could not be persisted.
    #[error("'{file}': failed to write output: {detail}")]
    OutputWriteFailed { file: String, detail: String },
}

impl DocumentError {
    /// Label of the pipeline stage that produced the error, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            DocumentError::UnsupportedFormat { .. } | DocumentError::Io { .. } => "input",
            DocumentError::DocumentCorrupt { .. } => "normalize",
            DocumentError::ExtractionFailure { .. } => "extract",
            DocumentError::MalformedResponse { .. } => "parse",
            DocumentError::OutputWriteFailed { .. } => "persist",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_not_found_display() {
        let e = ExtractError::FolderNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert!(e.to_string().contains("/no/such/dir"));
    }

    #[test]
    fn malformed_response_retains_raw() {
        let e = ExtractError::MalformedResponse {
            detail: "expected object".into(),
            raw: "I'm sorry, I cannot read this image.".into(),
        };
        assert!(e.to_string().contains("expected object"));
        if let ExtractError::MalformedResponse { raw, .. } = e {
            assert!(raw.contains("cannot read"));
        }
    }

    #[test]
    fn document_error_stage_labels() {
        let e = DocumentError::ExtractionFailure {
            file: "a.pdf".into(),
            retries: 2,
            detail: "HTTP 503".into(),
        };
        assert_eq!(e.stage(), "extract");
        assert!(e.to_string().contains("after 2 retries"));

        let e = DocumentError::DocumentCorrupt {
            file: "b.pdf".into(),
            detail: "bad xref".into(),
        };
        assert_eq!(e.stage(), "normalize");
    }

    #[test]
    fn document_error_serialises() {
        let e = DocumentError::UnsupportedFormat {
            file: "x.bmp".into(),
            extension: "bmp".into(),
        };
        let json = serde_json::to_string(&e).expect("must serialise");
        let back: DocumentError = serde_json::from_str(&json).expect("must deserialise");
        assert_eq!(back.stage(), "input");
    }
}
