//! Configuration types for talking to the document-AI service.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. Every orchestrator, the capture library and the
//! query dispatcher share one `Arc<ClientConfig>`, so a single value decides
//! where requests go, how they are retried and how previews are rasterised.

use crate::error::DwaniError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Header carrying the API key.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-KEY";

/// Largest preview side pdfium is asked to allocate.
pub const MAX_PREVIEW_PIXELS: u32 = 16_384;

/// Client configuration.
///
/// # Example
/// ```rust
/// use dwani_client::{BackoffPolicy, ClientConfig};
///
/// let config = ClientConfig::builder()
///     .base_url("https://api.dwani.ai")
///     .api_key("secret")
///     .max_attempts(3)
///     .backoff(BackoffPolicy::Exponential)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry.max_attempts, 3);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service root, without a trailing slash. Default: `http://localhost:8000`.
    pub base_url: String,

    /// API key injected into every request when set.
    pub api_key: Option<String>,

    /// Header name for [`Self::api_key`]. Default: `X-API-KEY`.
    pub api_key_header: String,

    /// Retry policy applied by the Retrying Fetcher.
    pub retry: RetryPolicy,

    /// Per-request timeout in seconds. Default: 120.
    ///
    /// Document flows run OCR, an LLM and a translation model server-side;
    /// a full page round trip regularly takes tens of seconds.
    pub request_timeout_secs: u64,

    /// Scale factor applied to the PDF page box when rendering previews.
    /// Default: 1.0 (one PDF point per pixel).
    pub preview_scale: f32,

    /// Upper bound on either preview dimension in pixels. Default: 2000.
    ///
    /// Caps memory for oversized page boxes (posters, engineering drawings)
    /// independently of [`Self::preview_scale`].
    pub max_preview_pixels: u32,

    /// Table the natural-language query endpoint searches. Default: `user_captures`.
    pub captures_table: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            retry: RetryPolicy::default(),
            request_timeout_secs: 120,
            preview_scale: 1.0,
            max_preview_pixels: 2000,
            captures_table: "user_captures".to_string(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("retry", &self.retry)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("preview_scale", &self.preview_scale)
            .field("max_preview_pixels", &self.max_preview_pixels)
            .field("captures_table", &self.captures_table)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from `DWANI_*` environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DWANI_API_BASE_URL` | `base_url` |
    /// | `DWANI_API_KEY` | `api_key` |
    /// | `DWANI_MAX_ATTEMPTS` | `retry.max_attempts` |
    /// | `DWANI_BACKOFF_MS` | `retry.backoff_ms` |
    pub fn from_env() -> Result<Self, DwaniError> {
        let mut builder = Self::builder();

        if let Some(url) = env_non_empty("DWANI_API_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(key) = env_non_empty("DWANI_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(raw) = env_non_empty("DWANI_MAX_ATTEMPTS") {
            let n = raw.parse::<u32>().map_err(|_| {
                DwaniError::InvalidConfig(format!("DWANI_MAX_ATTEMPTS must be an integer, got '{raw}'"))
            })?;
            builder = builder.max_attempts(n);
        }
        if let Some(raw) = env_non_empty("DWANI_BACKOFF_MS") {
            let ms = raw.parse::<u64>().map_err(|_| {
                DwaniError::InvalidConfig(format!("DWANI_BACKOFF_MS must be an integer, got '{raw}'"))
            })?;
            builder = builder.backoff_ms(ms);
        }

        builder.build()
    }

    /// Join an endpoint path onto the base URL.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_key_header(mut self, header: impl Into<String>) -> Self {
        self.config.api_key_header = header.into();
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.backoff_ms = ms;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.retry.backoff = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn preview_scale(mut self, scale: f32) -> Self {
        self.config.preview_scale = scale;
        self
    }

    pub fn max_preview_pixels(mut self, px: u32) -> Self {
        self.config.max_preview_pixels = px.max(100);
        self
    }

    pub fn captures_table(mut self, table: impl Into<String>) -> Self {
        self.config.captures_table = table.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, DwaniError> {
        let c = &self.config;
        if c.base_url.is_empty() {
            return Err(DwaniError::InvalidConfig("base URL must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(DwaniError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(DwaniError::InvalidConfig("max attempts must be ≥ 1".into()));
        }
        if !(c.preview_scale > 0.0 && c.preview_scale <= 8.0) {
            return Err(DwaniError::InvalidConfig(format!(
                "preview scale must be in (0, 8], got {}",
                c.preview_scale
            )));
        }
        if c.max_preview_pixels > MAX_PREVIEW_PIXELS {
            return Err(DwaniError::InvalidConfig(format!(
                "max preview pixels must be ≤ {}, got {}",
                MAX_PREVIEW_PIXELS, c.max_preview_pixels
            )));
        }
        if c.captures_table.trim().is_empty() {
            return Err(DwaniError::InvalidConfig("captures table must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffPolicy {
    /// The same `backoff_ms` before every retry. (default)
    #[default]
    Fixed,
    /// `backoff_ms * 2^(retry - 1)`: 1.5 s → 3 s → 6 s with the default base.
    Exponential,
}

/// Bounded retry policy for the Retrying Fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 4 (one try, three retries).
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds. Default: 1500.
    pub backoff_ms: u64,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_ms: 1500,
            backoff: BackoffPolicy::Fixed,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn fixed(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
            backoff: BackoffPolicy::Fixed,
        }
    }

    /// Delay before attempt number `attempt` (1-indexed). Zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let ms = match self.backoff {
            BackoffPolicy::Fixed => self.backoff_ms,
            BackoffPolicy::Exponential => {
                let exp = (attempt - 2).min(16);
                self.backoff_ms.saturating_mul(1u64 << exp)
            }
        };
        Duration::from_millis(ms)
    }
}
