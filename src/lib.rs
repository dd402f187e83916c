//! # browser-tools
//!
//! An HTTP service that turns web pages and PDFs into images, text and
//! Markdown.
//!
//! ## Operations
//!
//! ```text
//! HTML / URL ──▶ headless Chrome ──▶ PNG
//! PDF        ──▶ pdfium          ──▶ PNG (one page) | embedded text
//! PDF        ──▶ pdfium ──▶ vision model ──▶ Markdown + token usage
//! ```
//!
//! Each request is validated into a [`ConversionRequest`], given its own
//! scratch files by [`ScratchSpace`], handled by exactly one adapter and
//! answered with a uniform JSON envelope. Scratch files are deleted when the
//! request finishes, however it finishes.
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use browser_tools::adapters::{ChromiumRenderer, LlmMarkdownPipeline, PdfiumEngine};
//! use browser_tools::{server, Converter, ScratchSpace, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ServiceConfig::builder().api_key("sk-...").build()?);
//!     let scratch = ScratchSpace::new(&config.temp_path);
//!     let pdf = PdfiumEngine::new(config.pdf.clone());
//!     let converter = Converter::new(
//!         Arc::clone(&config),
//!         scratch.clone(),
//!         Arc::new(ChromiumRenderer::new(config.browser.clone(), scratch)),
//!         Arc::new(pdf.clone()),
//!         Arc::new(LlmMarkdownPipeline::new(config.ai.clone(), pdf)),
//!     );
//!     let app = server::router(server::AppState::new(converter));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `browser-tools` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapters;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod scratch;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AiSettings, BrowserSettings, PdfSettings, ServiceConfig, ServiceConfigBuilder};
pub use error::{ConvertError, ErrorKind};
pub use orchestrator::Converter;
pub use request::{
    ConversionRequest, ConversionResult, HtmlSource, HtmlToImageRequest, MarkdownOptions,
    PageSelection, PdfUpload, TokenUsage, Viewport,
};
pub use scratch::{ScratchDir, ScratchFile, ScratchSpace, ScratchStats};
