//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as the batch processes each invoice.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a Tokio broadcast channel, a database record, or a
//! terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so it
//! works correctly when documents are processed concurrently.

use std::sync::Arc;

/// Called by the orchestrator as it processes each invoice in a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1` the per-document methods
/// may be called from different threads; implementations must protect
/// shared mutable state accordingly.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any document is processed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document enters the pipeline.
    ///
    /// `index` is 1-based and reflects discovery order, not completion order.
    fn on_document_start(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a document's record has been persisted.
    fn on_document_complete(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a document fails at any stage after all retries.
    fn on_document_error(&self, index: usize, total: usize, file: &str, error: String) {
        let _ = (index, total, file, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type BatchProgress = Arc<dyn BatchProgressCallback>;
