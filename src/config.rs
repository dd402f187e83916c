//! Service configuration.
//!
//! Everything the orchestrator and adapters need to know is carried by one
//! [`ServiceConfig`], built once at startup through [`ServiceConfigBuilder`]
//! and shared behind an `Arc`. Nothing in the library reads the environment:
//! the binary maps flags and environment variables onto the builder, and the
//! Markdown adapter builds its provider from [`AiSettings`] alone.

use crate::error::ConvertError;
use crate::request::Viewport;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration shared by every request.
///
/// # Example
/// ```rust
/// use browser_tools::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .temp_path("/tmp/browser-tools/test")
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// assert_eq!(config.ai.model, "gpt-4.1-nano");
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Root directory for scratch artifacts. Default: `/tmp/browser-tools/server`.
    pub temp_path: PathBuf,

    /// Largest accepted request body in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Emit permissive CORS headers. Default: false.
    pub enable_cors: bool,

    /// Scratch files older than this are removed by the sweeper. Default: 1 h.
    ///
    /// Per-request cleanup already deletes every artifact; the sweeper only
    /// matters after a hard crash left files behind.
    pub stale_artifact_age: Duration,

    pub browser: BrowserSettings,
    pub pdf: PdfSettings,
    pub ai: AiSettings,
}

/// Headless Chrome settings for HTML/URL screenshots.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Viewport used when the request has no `size`. Default: 1080x1920.
    pub default_viewport: Viewport,

    /// Wall-clock budget for one render, launch included. Default: 60.
    pub page_timeout_secs: u64,

    /// Explicit Chrome/Chromium binary. `None` lets chromiumoxide search.
    pub chrome_executable: Option<PathBuf>,

    /// Pass `--no-sandbox` to Chrome (needed when running as root in containers).
    pub no_sandbox: bool,

    /// Upper bound for the per-request `wait_ms` settle delay. Default: 10 000.
    pub max_wait_ms: u64,
}

/// pdfium settings for PDF → image and PDF → text.
#[derive(Debug, Clone)]
pub struct PdfSettings {
    /// Rasterisation DPI. Default: 144 (twice the 72-point PDF unit).
    pub dpi: u32,

    /// Cap on either rendered edge in pixels. Default: 4000.
    ///
    /// A 144-DPI render of a poster-sized page could otherwise allocate
    /// hundreds of megabytes.
    pub max_rendered_pixels: u32,

    /// Directory or file path of the pdfium shared library. `None` uses the
    /// system search path.
    pub library_path: Option<PathBuf>,

    /// Wall-clock budget for one pdfium job. Default: 60.
    pub timeout_secs: u64,
}

/// Provider names accepted by [`ServiceConfigBuilder::provider`].
pub const AI_PROVIDERS: &[&str] = &["openai", "anthropic", "gemini", "ollama", "lmstudio"];

/// Vision-model settings for PDF → Markdown.
#[derive(Clone)]
pub struct AiSettings {
    /// One of [`AI_PROVIDERS`]. Default: `openai`.
    pub provider: String,

    /// Default model; requests may override it. Default: `gpt-4o-mini`.
    pub model: String,

    /// Provider credential. Required by the hosted providers; a missing key
    /// is reported per request as an internal error, never at startup.
    pub api_key: Option<String>,

    /// Alternate API endpoint: an OpenAI-compatible gateway, an Anthropic
    /// proxy, or the host of a local ollama / LM Studio server.
    pub base_url: Option<String>,

    /// Wall-clock budget for a whole document. Default: 300.
    pub timeout_secs: u64,

    /// Concurrent page calls when formatting continuity is not requested. Default: 10.
    pub concurrency: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Output token cap per page. Default: 4096.
    pub max_tokens: usize,

    /// DPI for page images sent to the model. Default: 150.
    pub dpi: u32,

    /// Cap on either edge of a page image. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Replaces the built-in transcription prompt.
    pub system_prompt: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            temp_path: PathBuf::from("/tmp/browser-tools/server"),
            max_upload_bytes: 50 * 1024 * 1024,
            enable_cors: false,
            stale_artifact_age: Duration::from_secs(3600),
            browser: BrowserSettings::default(),
            pdf: PdfSettings::default(),
            ai: AiSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            default_viewport: Viewport::DEFAULT,
            page_timeout_secs: 60,
            chrome_executable: None,
            no_sandbox: false,
            max_wait_ms: 10_000,
        }
    }
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            dpi: 144,
            max_rendered_pixels: 4000,
            library_path: None,
            timeout_secs: 60,
        }
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 300,
            concurrency: 10,
            temperature: 0.1,
            max_tokens: 4096,
            dpi: 150,
            max_rendered_pixels: 2000,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("temp_path", &self.temp_path)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("enable_cors", &self.enable_cors)
            .field("stale_artifact_age", &self.stale_artifact_age)
            .field("browser", &self.browser)
            .field("pdf", &self.pdf)
            .field("ai", &self.ai)
            .finish()
    }
}

impl fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    // ── Service ───────────────────────────────────────────────────────────

    pub fn temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_path = path.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn enable_cors(mut self, v: bool) -> Self {
        self.config.enable_cors = v;
        self
    }

    pub fn stale_artifact_age(mut self, age: Duration) -> Self {
        self.config.stale_artifact_age = age;
        self
    }

    // ── Browser ───────────────────────────────────────────────────────────

    pub fn default_viewport(mut self, viewport: Viewport) -> Self {
        self.config.browser.default_viewport = viewport;
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.browser.page_timeout_secs = secs;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser.chrome_executable = Some(path.into());
        self
    }

    pub fn no_sandbox(mut self, v: bool) -> Self {
        self.config.browser.no_sandbox = v;
        self
    }

    pub fn max_wait_ms(mut self, ms: u64) -> Self {
        self.config.browser.max_wait_ms = ms;
        self
    }

    // ── PDF ───────────────────────────────────────────────────────────────

    pub fn pdf_dpi(mut self, dpi: u32) -> Self {
        self.config.pdf.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn pdf_max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.pdf.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdf.library_path = Some(path.into());
        self
    }

    pub fn pdf_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pdf.timeout_secs = secs;
        self
    }

    // ── AI ────────────────────────────────────────────────────────────────

    /// Case-insensitive; checked against [`AI_PROVIDERS`] by `build`.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.ai.provider = name.into().trim().to_ascii_lowercase();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.ai.model = model.into();
        self
    }

    /// Empty strings are treated as "no key".
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.ai.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ai.base_url = Some(url.into());
        self
    }

    pub fn ai_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ai.timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.ai.concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.ai.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.ai.max_tokens = n;
        self
    }

    pub fn ai_dpi(mut self, dpi: u32) -> Self {
        self.config.ai.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn ai_max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.ai.max_rendered_pixels = px.max(100);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ai.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.temp_path.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "temp_path must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        for (name, secs) in [
            ("page_timeout_secs", c.browser.page_timeout_secs),
            ("pdf_timeout_secs", c.pdf.timeout_secs),
            ("ai_timeout_secs", c.ai.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConvertError::InvalidConfig(format!(
                    "{name} must be ≥ 1"
                )));
            }
        }
        if c.ai.max_tokens == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.ai.model.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "AI model must be non-empty".into(),
            ));
        }
        if !AI_PROVIDERS.contains(&c.ai.provider.as_str()) {
            return Err(ConvertError::InvalidConfig(format!(
                "unknown AI provider '{}', expected one of: {}",
                c.ai.provider,
                AI_PROVIDERS.join(", ")
            )));
        }
        if let Some(url) = &c.ai.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConvertError::InvalidConfig(format!(
                    "base_url must be an http(s) URL, got '{url}'"
                )));
            }
            if c.ai.provider == "gemini" {
                return Err(ConvertError::InvalidConfig(
                    "base_url is not supported for the gemini provider".into(),
                ));
            }
        }
        // A sweep must never delete an artifact an in-flight request still owns.
        let longest = c.browser_timeout().max(c.pdf_timeout()).max(c.ai_timeout());
        if c.stale_artifact_age <= longest {
            return Err(ConvertError::InvalidConfig(format!(
                "stale_artifact_age ({}s) must exceed the longest adapter timeout ({}s)",
                c.stale_artifact_age.as_secs(),
                longest.as_secs()
            )));
        }
        Ok(self.config)
    }
}

impl AiSettings {
    /// Hosted providers need a key; local ollama and LM Studio servers do not.
    pub fn requires_api_key(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "anthropic" | "gemini")
    }
}

impl ServiceConfig {
    /// Budget for one HTML/URL render.
    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.page_timeout_secs)
    }

    pub fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf.timeout_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_conventions() {
        let c = ServiceConfig::default();
        assert_eq!(c.temp_path, PathBuf::from("/tmp/browser-tools/server"));
        assert_eq!(c.browser.default_viewport, Viewport { width: 1080, height: 1920 });
        assert_eq!(c.browser.page_timeout_secs, 60);
        assert_eq!(c.pdf.dpi, 144);
        assert_eq!(c.ai.model, "gpt-4o-mini");
        assert!(c.ai.api_key.is_none());
    }

    #[test]
    fn builder_clamps() {
        let c = ServiceConfig::builder()
            .pdf_dpi(10)
            .ai_dpi(9999)
            .concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.pdf.dpi, 72);
        assert_eq!(c.ai.dpi, 400);
        assert_eq!(c.ai.concurrency, 1);
        assert_eq!(c.ai.temperature, 2.0);
    }

    #[test]
    fn blank_api_key_is_none() {
        let c = ServiceConfig::builder().api_key("   ").build().unwrap();
        assert!(c.ai.api_key.is_none());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ServiceConfig::builder().ai_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert!(err.to_string().contains("ai_timeout_secs"));
    }

    #[test]
    fn bad_base_url_rejected() {
        let err = ServiceConfig::builder()
            .base_url("ftp://proxy")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn provider_name_is_normalised_and_checked() {
        let c = ServiceConfig::builder().provider(" Ollama ").build().unwrap();
        assert_eq!(c.ai.provider, "ollama");
        assert!(!c.ai.requires_api_key());

        let err = ServiceConfig::builder().provider("azure").build().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert!(err.to_string().contains("azure"));
    }

    #[test]
    fn hosted_providers_require_a_key() {
        for name in ["openai", "anthropic", "gemini"] {
            let c = ServiceConfig::builder().provider(name).build().unwrap();
            assert!(c.ai.requires_api_key(), "{name}");
        }
        let c = ServiceConfig::builder().provider("lmstudio").build().unwrap();
        assert!(!c.ai.requires_api_key());
    }

    #[test]
    fn gemini_rejects_base_url() {
        let err = ServiceConfig::builder()
            .provider("gemini")
            .base_url("https://proxy.internal")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn stale_age_must_outlive_every_timeout() {
        let err = ServiceConfig::builder()
            .ai_timeout_secs(600)
            .stale_artifact_age(Duration::from_secs(600))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert!(err.to_string().contains("stale_artifact_age"));

        let err = ServiceConfig::builder()
            .page_timeout_secs(120)
            .stale_artifact_age(Duration::from_secs(60))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("(60s)"));

        let c = ServiceConfig::builder()
            .ai_timeout_secs(600)
            .stale_artifact_age(Duration::from_secs(601))
            .build()
            .unwrap();
        assert_eq!(c.ai_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ServiceConfig::builder()
            .api_key("sk-secret-123")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret-123"));
        assert!(dbg.contains("<redacted>"));
    }
}
