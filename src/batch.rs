//! Batch orchestration: drive every invoice in a folder through the
//! pipeline and persist one JSON record per input.
//!
//! ## Partial-failure policy
//!
//! A batch never aborts because one invoice is bad. Each document's
//! failure is caught at this boundary, logged with its stage and file
//! name, recorded in the [`BatchReport`], and the loop moves on. The only
//! fatal errors are the ones that doom every document equally: a missing
//! input folder or an unconfigured provider.
//!
//! VAT-check outcomes are even softer — a registry outage degrades the
//! `reliable_VAT_payer` field to a sentinel and the record still persists.

use crate::config::ExtractionConfig;
use crate::error::{DocumentError, ExtractError};
use crate::pipeline::extract::{ExtractionClient, ExtractionRequest, VisionClient};
use crate::pipeline::input::{self, file_label, DocumentFormat, SourceDocument};
use crate::pipeline::{normalize, parse};
use crate::prompts::{SYSTEM_PROMPT, TASK_PROMPT};
use crate::record::InvoiceRecord;
use crate::vat::{VatChecker, VatVerdict};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// What happened to one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// The input file.
    pub file: PathBuf,
    /// Path of the persisted record, when the document succeeded.
    pub output: Option<PathBuf>,
    /// Reliability verdict attached to the record, when one was produced.
    pub verdict: Option<VatVerdict>,
    /// The failure, when the document did not produce a record.
    pub error: Option<DocumentError>,
    /// Wall-clock time spent on this document.
    pub duration_ms: u64,
}

/// Aggregate counters for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub processed_documents: usize,
    pub failed_documents: usize,
    pub total_duration_ms: u64,
}

/// Full result of a batch run: per-document outcomes plus counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}

/// Process every supported invoice file in `folder`.
///
/// This is the primary entry point for the library. The extraction client
/// and VAT checker are resolved from the config; use
/// [`process_folder_with`] to inject either (tests, custom backends).
///
/// # Errors
/// Fatal errors only — a missing folder or an unconfigured provider.
/// Per-document failures land in the report, never here.
pub async fn process_folder(
    folder: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchReport, ExtractError> {
    let client: Arc<dyn ExtractionClient> = Arc::new(VisionClient::from_config(config)?);
    let checker = Arc::new(VatChecker::from_config(config)?);
    process_folder_with(folder, config, client, checker).await
}

/// [`process_folder`] with an injected client and checker.
pub async fn process_folder_with(
    folder: impl AsRef<Path>,
    config: &ExtractionConfig,
    client: Arc<dyn ExtractionClient>,
    checker: Arc<VatChecker>,
) -> Result<BatchReport, ExtractError> {
    let folder = folder.as_ref();
    let total_start = Instant::now();

    let files = input::discover_documents(folder)?;
    let total = files.len();

    if total == 0 {
        info!(
            "No supported invoice files found in '{}' (supported: {})",
            folder.display(),
            DocumentFormat::EXTENSIONS.join(", ")
        );
    } else {
        info!("Found {total} invoice file(s) in '{}'", folder.display());
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut outcomes: Vec<DocumentOutcome> = stream::iter(files.into_iter().enumerate().map(
        |(i, path)| {
            let client = Arc::clone(&client);
            let checker = Arc::clone(&checker);
            let config = config.clone();
            async move {
                let index = i + 1;
                let label = file_label(&path);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_start(index, total, &label);
                }

                let start = Instant::now();
                let result = process_document(&path, &config, client.as_ref(), &checker).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok((output, verdict)) => {
                        info!("Processed '{label}' → {} ({verdict})", output.display());
                        if let Some(ref cb) = config.progress_callback {
                            cb.on_document_complete(index, total, &label);
                        }
                        DocumentOutcome {
                            file: path,
                            output: Some(output),
                            verdict: Some(verdict),
                            error: None,
                            duration_ms,
                        }
                    }
                    Err(e) => {
                        warn!("Failed '{label}' at stage '{}': {e}", e.stage());
                        if let Some(ref cb) = config.progress_callback {
                            cb.on_document_error(index, total, &label, e.to_string());
                        }
                        DocumentOutcome {
                            file: path,
                            output: None,
                            verdict: None,
                            error: Some(e),
                            duration_ms,
                        }
                    }
                }
            }
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    // buffer_unordered yields in completion order; report in discovery order.
    outcomes.sort_by(|a, b| a.file.cmp(&b.file));

    let processed = outcomes.iter().filter(|o| o.error.is_none()).count();
    let stats = BatchStats {
        total_documents: total,
        processed_documents: processed,
        failed_documents: total - processed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} invoices in {}ms",
        processed, total, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, processed);
    }

    Ok(BatchReport { outcomes, stats })
}

/// Run one invoice through the full pipeline and persist its record.
///
/// Returns the output path and the attached reliability verdict.
pub async fn process_document(
    path: &Path,
    config: &ExtractionConfig,
    client: &dyn ExtractionClient,
    checker: &VatChecker,
) -> Result<(PathBuf, VatVerdict), DocumentError> {
    let (record, verdict) = extract_invoice_with(path, config, client, checker).await?;
    let output = persist_record(&record, path, config).await?;
    Ok((output, verdict))
}

/// Run one invoice through normalize → extract → parse → VAT check,
/// without persisting.
///
/// The record comes back with `reliable_VAT_payer` already set — this is
/// the single mutation the record sees in its lifetime.
pub async fn extract_invoice_with(
    path: &Path,
    config: &ExtractionConfig,
    client: &dyn ExtractionClient,
    checker: &VatChecker,
) -> Result<(InvoiceRecord, VatVerdict), DocumentError> {
    let label = file_label(path);

    let doc = SourceDocument::read(path)?;
    let image = normalize::normalize(&doc, config).await?;
    let raw = extract_with_retry(client, &image, config, &label).await?;

    let mut record = parse::parse_response(&raw).map_err(|e| match e {
        ExtractError::MalformedResponse { detail, raw } => DocumentError::MalformedResponse {
            file: label.clone(),
            detail,
            raw,
        },
        other => DocumentError::MalformedResponse {
            file: label.clone(),
            detail: other.to_string(),
            raw: String::new(),
        },
    })?;

    let verdict = match record.vat_number().map(str::to_owned) {
        Some(vat) => {
            debug!("Checking VAT reliability for '{vat}'");
            checker.check(&vat).await
        }
        None => {
            debug!("'{label}': no VAT number to verify");
            VatVerdict::NoVatNumber
        }
    };
    record.set_reliability(verdict.to_field_value());

    Ok((record, verdict))
}

/// Call the extraction backend with bounded exponential backoff.
///
/// The wait sequence with the 500 ms default and 2 retries is
/// 500 ms → 1 s, under 2 s of back-off per invoice.
async fn extract_with_retry(
    client: &dyn ExtractionClient,
    image: &normalize::NormalizedImage,
    config: &ExtractionConfig,
    file: &str,
) -> Result<String, DocumentError> {
    let request = ExtractionRequest {
        system_prompt: config.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT),
        image,
        task: TASK_PROMPT,
    };

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "'{file}': retry {attempt}/{} after {backoff}ms",
                config.max_retries
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match client.extract(request).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!("'{file}': extraction attempt {} failed — {e}", attempt + 1);
                last_err = Some(e.to_string());
            }
        }
    }

    Err(DocumentError::ExtractionFailure {
        file: file.to_string(),
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
    })
}

/// Output path for one input: `<stem>_extracted.json`, in the configured
/// output directory or next to the input.
pub fn output_path(input: &Path, config: &ExtractionConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "invoice".to_string());
    let name = format!("{stem}_extracted.json");
    match config.output_dir {
        Some(ref dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Persist a completed record.
///
/// Atomic write (temp file + rename) so a crash mid-write never leaves a
/// half-valid JSON file for downstream automation to choke on.
async fn persist_record(
    record: &InvoiceRecord,
    input: &Path,
    config: &ExtractionConfig,
) -> Result<PathBuf, DocumentError> {
    let path = output_path(input, config);
    let write_failed = |e: std::io::Error| DocumentError::OutputWriteFailed {
        file: file_label(input),
        detail: format!("{}: {e}", path.display()),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, record.to_pretty_json())
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(write_failed)?;

    debug!("Wrote {}", path.display());
    Ok(path)
}
