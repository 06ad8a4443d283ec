//! CLI binary for invoice2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints per-invoice results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice2json::{
    process_folder, BatchProgress, BatchProgressCallback, BatchReport, ExtractionConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per invoice.
/// Works correctly when invoices complete out-of-order (concurrency > 1).
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for invoices…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_documents} invoice file(s)"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, file: &str) {
        self.bar.set_message(file.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, file: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            file,
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, file: &str, error: String) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 80 {
            let cut = error
                .char_indices()
                .take_while(|(i, _)| *i < 79)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{}\u{2026}", &error[..cut])
        } else {
            error
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            file,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if total_documents == 0 {
            return;
        }
        if failed == 0 {
            eprintln!(
                "{} {} invoice(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices extracted  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every invoice in the current folder
  invoice2json

  # A specific folder, outputs collected elsewhere
  invoice2json ./inbox -o ./records

  # Use a specific model
  invoice2json --provider openai --model gpt-4.1 ./invoices

  # Phone scans: run the enhancement filter chain
  invoice2json --enhance ./scans

  # Dense invoices: render PDFs at 3x magnification
  invoice2json --pdf-scale 3.0 ./invoices

  # Machine-readable batch report
  invoice2json --json ./invoices > report.json

OUTPUT:
  One file per invoice, named <input-stem>_extracted.json, containing the
  twelve extracted fields plus the VAT payer reliability verdict:
  true (reliable), false (unreliable), or a sentinel string when the
  registry could not confirm either way.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Extract:         invoice2json ./invoices

  PDFium (~30 MB) is handled automatically on first run; no manual library
  setup is required.
"#;

/// Extract structured records from invoice PDFs and scans using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract structured invoice records using Vision LLMs, with Czech VAT reliability checks",
    long_about = "Convert invoice documents (PDF, PNG, JPG, GIF, WEBP) into structured JSON \
records using Vision Language Models. Each extracted VAT number is verified against the \
Czech Ministry of Finance unreliable-payer registry.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing invoice files.
    #[arg(default_value = ".")]
    folder: PathBuf,

    /// Write JSON records to this folder instead of next to the inputs.
    #[arg(short, long, env = "INVOICE2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "INVOICE2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(
        long,
        env = "INVOICE2JSON_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, ollama, or any OpenAI-compatible endpoint."
    )]
    provider: Option<String>,

    /// Enhance raster inputs (contrast/sharpness/brightness/unsharp mask).
    #[arg(long, env = "INVOICE2JSON_ENHANCE")]
    enhance: bool,

    /// PDF first-page magnification (2.0–3.0).
    #[arg(long, env = "INVOICE2JSON_PDF_SCALE", default_value_t = 2.0)]
    pdf_scale: f32,

    /// Number of invoices processed concurrently.
    #[arg(short, long, env = "INVOICE2JSON_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per invoice on extraction failure.
    #[arg(long, env = "INVOICE2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Max LLM output tokens per invoice.
    #[arg(long, env = "INVOICE2JSON_MAX_TOKENS", default_value_t = 500)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE2JSON_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Per-invoice LLM call timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// VAT registry endpoint override.
    #[arg(long, env = "INVOICE2JSON_VAT_ENDPOINT")]
    vat_endpoint: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "INVOICE2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output the batch report as JSON on stdout.
    #[arg(long, env = "INVOICE2JSON_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "INVOICE2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure the PDFium engine is available ────────────────────────────
    // With `--features bundled` (default) the shared library was embedded
    // at compile time and only needs extracting. Without it, the first run
    // downloads the library (~30 MB); later startups are a path check.
    #[cfg(feature = "bundled")]
    {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_bundled())
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            eprintln!("{} downloading PDFium engine (first run only)…", cyan("◆"));
        }
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<BatchProgress> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run the batch ────────────────────────────────────────────────────
    let report = process_folder(&cli.folder, &config)
        .await
        .context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    print_summary(&cli, &report);
    Ok(())
}

fn print_summary(cli: &Cli, report: &BatchReport) {
    if cli.quiet {
        return;
    }

    if report.stats.total_documents == 0 {
        eprintln!(
            "No supported invoice files found in '{}'.",
            cli.folder.display()
        );
        eprintln!("Supported formats: PDF, PNG, JPG, JPEG, GIF, WEBP");
        return;
    }

    for outcome in &report.outcomes {
        if let Some(ref output) = outcome.output {
            eprintln!(
                "   {} {}",
                dim("→"),
                bold(&output.display().to_string())
            );
        }
    }

    // The progress callback already printed per-invoice ticks; in
    // no-progress mode print the aggregate line here instead.
    if cli.no_progress {
        eprintln!(
            "Extracted {}/{} invoices in {}ms",
            report.stats.processed_documents,
            report.stats.total_documents,
            report.stats.total_duration_ms
        );
        if report.stats.failed_documents > 0 {
            eprintln!("  {} invoice(s) failed", report.stats.failed_documents);
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<BatchProgress>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {path:?}"))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .pdf_scale(cli.pdf_scale)
        .enhance(cli.enhance)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref endpoint) = cli.vat_endpoint {
        builder = builder.vat_endpoint(endpoint);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    config.model = cli.model.clone();
    // The library never touches the environment; picking a provider from
    // the available API keys is a CLI convenience and happens here.
    config.provider_name = cli.provider.clone().or_else(detect_provider);

    Ok(config)
}

/// Pick a provider name from whichever API key is present.
fn detect_provider() -> Option<String> {
    for (var, provider) in [
        ("OPENAI_API_KEY", "openai"),
        ("ANTHROPIC_API_KEY", "anthropic"),
        ("GEMINI_API_KEY", "gemini"),
    ] {
        if std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false) {
            return Some(provider.to_string());
        }
    }
    None
}
