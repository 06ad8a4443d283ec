//! # invoice2json
//!
//! Extract structured records from invoice documents using Vision Language
//! Models, with Czech VAT payer reliability verdicts attached.
//!
//! ## Why this crate?
//!
//! Template-based invoice parsers break on every new supplier layout, and
//! classic OCR loses the table structure that VAT summaries live in.
//! Instead this crate turns each invoice — PDF or scan — into a single
//! still image and lets a VLM read it as a bookkeeper would, returning a
//! fixed twelve-field JSON record. The extracted VAT number is then checked
//! against the Czech Ministry of Finance registry, so every record carries
//! a reliability verdict alongside the amounts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! invoice folder (*.pdf *.png *.jpg *.jpeg *.gif *.webp)
//!  │
//!  ├─ 1. Discover   scan for supported extensions, case-insensitive
//!  ├─ 2. Normalize  render PDF first page via pdfium / enhance a scan
//!  ├─ 3. Encode     bitmap → base64 for the multimodal request body
//!  ├─ 4. Extract    vision-LLM call with the fixed schema prompt
//!  ├─ 5. Parse      defensive JSON validation (twelve fields, no repair)
//!  ├─ 6. Verify     SOAP lookup in the VAT payer registry
//!  └─ 7. Persist    <stem>_extracted.json per invoice
//! ```
//!
//! One bad invoice never sinks the batch: failures are recorded per
//! document in the [`BatchReport`] and processing continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice2json::{process_folder, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .provider_name("openai")
//!         .model("gpt-4.1-nano")
//!         .build()?;
//!     let report = process_folder("./invoices", &config).await?;
//!     println!(
//!         "{}/{} invoices extracted",
//!         report.stats.processed_documents, report.stats.total_documents
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`     | on | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber) |
//! | `bundled` | on | Embeds the pdfium shared library in the binary at compile time |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! invoice2json = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod vat;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    extract_invoice_with, process_document, process_folder, process_folder_with, BatchReport,
    BatchStats, DocumentOutcome,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{DocumentError, ExtractError};
pub use pipeline::extract::{ExtractionClient, ExtractionRequest, VisionClient};
pub use pipeline::input::{DocumentFormat, SourceDocument};
pub use pipeline::normalize::NormalizedImage;
pub use progress::{BatchProgress, BatchProgressCallback, NoopProgressCallback};
pub use record::InvoiceRecord;
pub use vat::{VatChecker, VatIdentifier, VatVerdict, DEFAULT_VAT_ENDPOINT};
