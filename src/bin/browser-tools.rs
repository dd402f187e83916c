//! HTTP server binary for browser-tools.
//!
//! Maps flags and `BROWSER_TOOLS_*` environment variables onto
//! `ServiceConfig`, wires the real adapters and serves until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use browser_tools::adapters::{ChromiumRenderer, LlmMarkdownPipeline, PdfiumEngine};
use browser_tools::server::{self, AppState};
use browser_tools::{Converter, ScratchSpace, ServiceConfig, Viewport};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "browser-tools",
    version,
    about = "HTTP service converting HTML/URLs and PDFs to images, text and Markdown",
    color = clap::ColorChoice::Auto
)]
struct Cli {
    // ── Server ───────────────────────────────────────────────────────────
    /// Address to bind.
    #[arg(long, env = "BROWSER_TOOLS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "BROWSER_TOOLS_PORT", default_value_t = 8080)]
    port: u16,

    /// Emit permissive CORS headers.
    #[arg(long, env = "BROWSER_TOOLS_CORS_ENABLED")]
    cors: bool,

    /// Largest accepted request body, in MiB.
    #[arg(long, env = "BROWSER_TOOLS_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    // ── Logging ──────────────────────────────────────────────────────────
    /// Debug mode; together with --verbose enables DEBUG-level logs.
    #[arg(long, env = "BROWSER_TOOLS_DEBUG")]
    debug: bool,

    /// Verbose logging (see --debug).
    #[arg(short, long, env = "BROWSER_TOOLS_VERBOSE")]
    verbose: bool,

    /// Log as JSON lines (true/false).
    #[arg(long, env = "BROWSER_TOOLS_LOG_JSON_MODE", default_value_t = true,
          action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    log_json: bool,

    // ── Scratch files ────────────────────────────────────────────────────
    /// Base directory for temporary files; the server uses `<path>/server`.
    #[arg(long, env = "BROWSER_TOOLS_TEMP_PATH", default_value = "/tmp/browser-tools")]
    temp_path: PathBuf,

    /// Remove leftover scratch files older than this many seconds.
    #[arg(long, env = "BROWSER_TOOLS_STALE_AFTER_SECS", default_value_t = 3600)]
    stale_after_secs: u64,

    /// How often the stale-file sweeper runs, in seconds.
    #[arg(long, env = "BROWSER_TOOLS_SWEEP_INTERVAL_SECS", default_value_t = 600)]
    sweep_interval_secs: u64,

    // ── Browser ──────────────────────────────────────────────────────────
    /// Chrome/Chromium executable; auto-detected when unset.
    #[arg(long, env = "BROWSER_TOOLS_CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Launch Chrome with --no-sandbox (containers running as root).
    #[arg(long, env = "BROWSER_TOOLS_NO_SANDBOX")]
    no_sandbox: bool,

    /// Default viewport as WIDTHxHEIGHT.
    #[arg(long, env = "BROWSER_TOOLS_VIEWPORT", default_value = "1080x1920")]
    viewport: String,

    /// Per-render browser timeout in seconds.
    #[arg(long, env = "BROWSER_TOOLS_PAGE_TIMEOUT_SECS", default_value_t = 60)]
    page_timeout: u64,

    /// Upper bound for the per-request wait_ms field.
    #[arg(long, env = "BROWSER_TOOLS_MAX_WAIT_MS", default_value_t = 10_000)]
    max_wait_ms: u64,

    // ── PDF ──────────────────────────────────────────────────────────────
    /// pdfium shared library (file or directory); system search path when unset.
    #[arg(long, env = "BROWSER_TOOLS_PDFIUM_PATH")]
    pdfium_path: Option<PathBuf>,

    /// PDF → image rendering DPI (72–400).
    #[arg(long, env = "BROWSER_TOOLS_PDF_DPI", default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    pdf_dpi: u32,

    /// Per-job pdfium timeout in seconds.
    #[arg(long, env = "BROWSER_TOOLS_PDF_TIMEOUT_SECS", default_value_t = 60)]
    pdf_timeout: u64,

    // ── AI ───────────────────────────────────────────────────────────────
    /// LLM provider: openai, anthropic, gemini, ollama, lmstudio.
    #[arg(long, env = "BROWSER_TOOLS_AI_PROVIDER", default_value = "openai")]
    provider: String,

    /// Default vision model for PDF → Markdown.
    #[arg(long, env = "BROWSER_TOOLS_ZEROX_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Provider API key. Falls back to OPENAI_API_KEY, ANTHROPIC_API_KEY or
    /// GEMINI_API_KEY according to --provider.
    #[arg(long, env = "BROWSER_TOOLS_AI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Alternate provider endpoint, or the host of a local ollama / LM Studio server.
    #[arg(long, env = "BROWSER_TOOLS_AI_BASE_URL")]
    base_url: Option<String>,

    /// Whole-document Markdown timeout in seconds.
    #[arg(long, env = "BROWSER_TOOLS_AI_TIMEOUT_SECS", default_value_t = 300)]
    ai_timeout: u64,

    /// Concurrent page calls.
    #[arg(short, long, env = "BROWSER_TOOLS_AI_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Page image DPI sent to the model (72–400).
    #[arg(long, env = "BROWSER_TOOLS_AI_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    ai_dpi: u32,

    /// Max output tokens per page.
    #[arg(long, env = "BROWSER_TOOLS_AI_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "BROWSER_TOOLS_AI_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Text file containing a custom system prompt.
    #[arg(long, env = "BROWSER_TOOLS_AI_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?
        .block_on(run(cli))
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug && cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},chromiumoxide=warn,hyper=warn")));
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if cli.log_json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

async fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let viewport: Viewport = cli
        .viewport
        .parse()
        .with_context(|| format!("Invalid --viewport '{}'", cli.viewport))?;

    let mut builder = ServiceConfig::builder()
        .temp_path(cli.temp_path.join("server"))
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .enable_cors(cli.cors)
        .stale_artifact_age(Duration::from_secs(cli.stale_after_secs))
        .default_viewport(viewport)
        .page_timeout_secs(cli.page_timeout)
        .no_sandbox(cli.no_sandbox)
        .max_wait_ms(cli.max_wait_ms)
        .pdf_dpi(cli.pdf_dpi)
        .pdf_timeout_secs(cli.pdf_timeout)
        .provider(&cli.provider)
        .model(&cli.model)
        .ai_timeout_secs(cli.ai_timeout)
        .concurrency(cli.concurrency)
        .ai_dpi(cli.ai_dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(path) = &cli.chrome {
        builder = builder.chrome_executable(path);
    }
    if let Some(path) = &cli.pdfium_path {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(key) = api_key(cli) {
        builder = builder.api_key(key);
    }
    if let Some(url) = &cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(path) = &cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    Ok(builder.build()?)
}

/// `--api-key` wins; otherwise the provider's conventional variable.
fn api_key(cli: &Cli) -> Option<String> {
    cli.api_key.clone().or_else(|| {
        let var = match cli.provider.trim().to_ascii_lowercase().as_str() {
            "openai" => "OPENAI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            "gemini" => "GEMINI_API_KEY",
            _ => return None,
        };
        std::env::var(var).ok()
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(build_config(&cli).await?);
    info!("Starting browser-tools {} with {:?}", env!("CARGO_PKG_VERSION"), config);

    let scratch = ScratchSpace::new(&config.temp_path);
    scratch.ensure_root().await?;
    scratch.sweep_older_than(config.stale_artifact_age).await?;
    spawn_sweeper(
        scratch.clone(),
        config.stale_artifact_age,
        Duration::from_secs(cli.sweep_interval_secs.max(1)),
    );

    let pdf = PdfiumEngine::new(config.pdf.clone());
    if let Err(e) = pdf.probe().await {
        warn!("pdfium unavailable, PDF endpoints will fail: {}", e);
    }
    if config.ai.requires_api_key() && config.ai.api_key.is_none() {
        warn!(
            "No API key for AI provider '{}'; PDF → Markdown requests will fail",
            config.ai.provider
        );
    }

    let converter = Converter::new(
        Arc::clone(&config),
        scratch.clone(),
        Arc::new(ChromiumRenderer::new(config.browser.clone(), scratch)),
        Arc::new(pdf.clone()),
        Arc::new(LlmMarkdownPipeline::new(config.ai.clone(), pdf)),
    );
    let app = server::router(AppState::new(converter));

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically remove scratch files a crashed request may have left behind.
fn spawn_sweeper(scratch: ScratchSpace, age: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(e) = scratch.sweep_older_than(age).await {
                warn!("Scratch sweep failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
