//! Pipeline stages for invoice-to-record extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the extraction backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ encode ──▶ extract ──▶ parse
//! (folder)  (pdfium/     (base64)   (vision    (schema
//!            filters)                 LLM)       check)
//! ```
//!
//! 1. [`input`]     — discover supported files, detect formats, read bytes
//! 2. [`normalize`] — render the first PDF page / enhance a scan; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    — base64-wrap the bitmap for the multimodal request body
//! 4. [`extract`]   — drive the vision-LLM call; the only stage with
//!    backend network I/O
//! 5. [`parse`]     — defensive validation of the backend's raw text into
//!    an [`crate::record::InvoiceRecord`]

pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod parse;
