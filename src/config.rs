//! Configuration for invoice extraction batches.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct
//! makes it trivial to share configs across threads, serialise them for
//! logging, and diff two runs to understand why their outputs differ.
//!
//! # Design choice: explicit configuration over ambient state
//! Nothing in the library reads environment variables. The vision provider
//! is either passed pre-built ([`ExtractionConfig::provider`]) or named
//! ([`ExtractionConfig::provider_name`]); API-key lookup is the concern of
//! whoever constructs the provider (the CLI, a test harness), never of
//! pipeline logic.

use crate::error::ExtractError;
use crate::progress::BatchProgress;
use crate::vat::DEFAULT_VAT_ENDPOINT;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one extraction batch.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .pdf_scale(3.0)
///     .enhance(true)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Magnification factor applied when rasterising the first PDF page.
    /// Range: 2.0–3.0. Default: 2.0.
    ///
    /// 2× keeps request payloads small while leaving typical invoice body
    /// text legible to the model. Raise towards 3× for invoices with dense
    /// footers or small-print VAT summaries — the registry-relevant fields
    /// tend to live there.
    pub pdf_scale: f32,

    /// Run the enhancement filter chain on raster (non-PDF) inputs.
    /// Default: false.
    ///
    /// The chain (contrast, sharpness, brightness, unsharp mask — in that
    /// fixed order) helps low-quality phone scans but re-encodes the image
    /// as PNG, so it is opt-in. PDF renders are already crisp and skip it.
    pub enhance: bool,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the extraction completion. Default: 0.2.
    ///
    /// Low temperature keeps the model faithful to what is printed on the
    /// invoice. Higher values introduce creativity that corrupts amounts
    /// and dates.
    pub temperature: f32,

    /// Maximum tokens the backend may generate per invoice. Default: 500.
    ///
    /// A twelve-field JSON object fits in well under 300 tokens; 500 gives
    /// headroom for long supplier names without letting a rambling model
    /// run up cost.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient extraction failure. Default: 2.
    ///
    /// Most 5xx and timeout errors are transient. Retrying twice catches
    /// the vast majority; permanent errors (bad API key) keep failing fast.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-extraction-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// VAT registry endpoint URL. Default: the Czech Ministry of Finance
    /// production service. Overridable for tests and registry relocations.
    pub vat_endpoint: String,

    /// VAT registry call timeout in seconds. Default: 10.
    pub vat_timeout_secs: u64,

    /// Number of invoices processed concurrently. Default: 1 (sequential).
    ///
    /// Documents are fully independent, so raising this is safe; it mainly
    /// helps when the extraction backend is the bottleneck. Rate-limited
    /// backends may prefer the sequential default.
    pub concurrency: usize,

    /// Directory for `<stem>_extracted.json` outputs.
    /// If None, each output is written next to its input file.
    pub output_dir: Option<PathBuf>,

    /// Custom system prompt. If None, uses [`crate::prompts::SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Optional progress callback receiving per-document events.
    pub progress_callback: Option<BatchProgress>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf_scale: 2.0,
            enhance: false,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 500,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            vat_endpoint: DEFAULT_VAT_ENDPOINT.to_string(),
            vat_timeout_secs: 10,
            concurrency: 1,
            output_dir: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("pdf_scale", &self.pdf_scale)
            .field("enhance", &self.enhance)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("vat_endpoint", &self.vat_endpoint)
            .field("vat_timeout_secs", &self.vat_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn pdf_scale(mut self, scale: f32) -> Self {
        self.config.pdf_scale = scale.clamp(2.0, 3.0);
        self
    }

    pub fn enhance(mut self, v: bool) -> Self {
        self.config.enhance = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn vat_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.vat_endpoint = url.into();
        self
    }

    pub fn vat_timeout_secs(mut self, secs: u64) -> Self {
        self.config.vat_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: BatchProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(2.0..=3.0).contains(&c.pdf_scale) {
            return Err(ExtractError::InvalidConfig(format!(
                "PDF scale must be 2.0–3.0, got {}",
                c.pdf_scale
            )));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.vat_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.vat_endpoint.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "VAT endpoint must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
