//! Conversion adapters: one per external capability.
//!
//! Each adapter wraps exactly one engine (headless Chrome, pdfium, a vision
//! model) and translates its output and its failures into this crate's
//! vocabulary. The orchestrator only sees these traits, so tests swap in
//! fakes and the binary wires in the real engines.
//!
//! Scratch guards are passed by value (or as `Arc`) so adapters can move them
//! into spawned or blocking tasks. If the request future is dropped midway,
//! the task keeps the guard alive until it finishes and the file is still
//! deleted exactly once.

use crate::error::ConvertError;
use crate::request::{HtmlToImageRequest, MarkdownOptions, PageSelection, TokenUsage};
use crate::scratch::ScratchFile;
use async_trait::async_trait;
use std::sync::Arc;

pub mod browser;
pub mod markdown;
pub mod pdf;

pub use browser::ChromiumRenderer;
pub use markdown::LlmMarkdownPipeline;
pub use pdf::PdfiumEngine;

/// Renders a URL or inline HTML document to a PNG screenshot.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Write a full-page PNG into `output` and hand it back.
    async fn screenshot(
        &self,
        request: &HtmlToImageRequest,
        output: ScratchFile,
    ) -> Result<ScratchFile, ConvertError>;
}

/// Rasterises pages and extracts embedded text.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Render 1-indexed `page` of `pdf` as PNG into `output`.
    async fn render_page(
        &self,
        pdf: Arc<ScratchFile>,
        page: usize,
        output: ScratchFile,
    ) -> Result<ScratchFile, ConvertError>;

    /// Concatenated embedded text of the selected pages. No OCR.
    async fn extract_text(
        &self,
        pdf: Arc<ScratchFile>,
        pages: PageSelection,
    ) -> Result<String, ConvertError>;
}

/// Markdown produced by the AI pipeline.
#[derive(Debug, Clone)]
pub struct MarkdownOutput {
    pub markdown: String,
    pub usage: TokenUsage,
}

/// Converts a whole PDF to Markdown with a vision model.
#[async_trait]
pub trait MarkdownPipeline: Send + Sync {
    async fn convert(
        &self,
        pdf: Arc<ScratchFile>,
        options: &MarkdownOptions,
    ) -> Result<MarkdownOutput, ConvertError>;
}
