//! End-to-end tests against the real engines.
//!
//! These launch headless Chrome, bind pdfium and (for Markdown) call a live
//! vision model. They are gated behind `E2E_ENABLED` so they do not run in CI
//! unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! Optional:
//!   BROWSER_TOOLS_CHROME_PATH  Chrome/Chromium binary (auto-detected otherwise)
//!   BROWSER_TOOLS_NO_SANDBOX=1 when running as root in a container
//!   OPENAI_API_KEY             enables the Markdown test

use browser_tools::adapters::{
    ChromiumRenderer, HtmlRenderer, LlmMarkdownPipeline, MarkdownPipeline, PdfEngine, PdfiumEngine,
};
use browser_tools::{
    BrowserSettings, HtmlSource, HtmlToImageRequest, MarkdownOptions, PageSelection, PdfSettings,
    ScratchSpace, ServiceConfig, Viewport,
};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn browser_settings() -> BrowserSettings {
    let mut settings = BrowserSettings::default();
    settings.chrome_executable = std::env::var_os("BROWSER_TOOLS_CHROME_PATH").map(Into::into);
    settings.no_sandbox = std::env::var("BROWSER_TOOLS_NO_SANDBOX").is_ok();
    settings
}

fn png_dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).expect("screenshot should be a decodable image");
    (img.width(), img.height())
}

/// A well-formed PDF with one Helvetica text line per page, xref offsets
/// computed so pdfium opens it without repair.
fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let n = lines.len();
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + i * 2)).collect();
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());
    for (i, line) in lines.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + i * 2
        ));
        let stream = format!("BT /F1 24 Tf 72 700 Td ({line}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

// ── Browser ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn screenshot_example_dot_com() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::new(tmp.path());
    let renderer = ChromiumRenderer::new(browser_settings(), scratch.clone());

    let request = HtmlToImageRequest {
        source: HtmlSource::parse("https://example.com").unwrap(),
        viewport: Viewport { width: 1280, height: 720 },
        wait_ms: 0,
    };
    let output = scratch.acquire("screenshot", "png").await.unwrap();
    let output = renderer.screenshot(&request, output).await.expect("screenshot should succeed");

    let (w, h) = png_dimensions(&output.read().await.unwrap());
    assert!(w > 0 && h > 0);
    println!("example.com → {w}x{h}");

    drop(output);
    assert_eq!(scratch.stats().outstanding(), 0, "profile dir and output must be released");
}

#[tokio::test]
async fn inline_html_renders_at_viewport_width_and_is_repeatable() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::new(tmp.path());
    let renderer = ChromiumRenderer::new(browser_settings(), scratch.clone());

    let request = HtmlToImageRequest {
        source: HtmlSource::parse("<html><body style='margin:0'><h1>Hello</h1></body></html>").unwrap(),
        viewport: Viewport { width: 800, height: 600 },
        wait_ms: 0,
    };

    let mut sizes = Vec::new();
    for _ in 0..2 {
        let output = scratch.acquire("screenshot", "png").await.unwrap();
        let output = renderer.screenshot(&request, output).await.unwrap();
        sizes.push(png_dimensions(&output.read().await.unwrap()));
    }

    assert_eq!(sizes[0], sizes[1], "same input should give the same dimensions");
    assert_eq!(sizes[0].0, 800);
}

// ── pdfium ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdfium_renders_and_extracts_text() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::new(tmp.path());
    let engine = PdfiumEngine::new(PdfSettings::default());
    engine.probe().await.expect("pdfium should bind");

    let pdf = Arc::new(
        scratch
            .adopt("upload", "pdf", &text_pdf(&["Hello pdfium", "Second page"]))
            .await
            .unwrap(),
    );

    let output = scratch.acquire("page", "png").await.unwrap();
    let output = engine.render_page(Arc::clone(&pdf), 1, output).await.unwrap();
    let (w, h) = png_dimensions(&output.read().await.unwrap());
    // 612x792pt at 144 DPI
    assert_eq!((w, h), (1224, 1584));

    let text = engine.extract_text(Arc::clone(&pdf), PageSelection::All).await.unwrap();
    assert!(text.contains("Hello pdfium"), "got: {text:?}");
    assert!(text.contains("Second page"));

    let err = engine
        .extract_text(Arc::clone(&pdf), PageSelection::Single(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "page_out_of_range");
}

#[tokio::test]
async fn pdfium_rejects_truncated_document() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::new(tmp.path());
    let engine = PdfiumEngine::new(PdfSettings::default());

    let pdf = Arc::new(scratch.adopt("upload", "pdf", b"%PDF-1.4\n%garbage").await.unwrap());
    let err = engine.extract_text(pdf, PageSelection::All).await.unwrap_err();
    assert!(err.is_business(), "expected business error, got {err:?}");
    assert_eq!(err.code(), "invalid_pdf");
}

// ── Vision model (needs API key) ─────────────────────────────────────────────

#[tokio::test]
async fn markdown_from_live_model() {
    e2e_skip_unless_enabled!();
    let Ok(key) = std::env::var("OPENAI_API_KEY") else {
        println!("SKIP: OPENAI_API_KEY not set");
        return;
    };

    let config = ServiceConfig::builder().api_key(key).build().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let scratch = ScratchSpace::new(tmp.path());
    let pipeline = LlmMarkdownPipeline::new(config.ai.clone(), PdfiumEngine::new(config.pdf.clone()));

    let pdf = Arc::new(
        scratch
            .adopt("upload", "pdf", &text_pdf(&["Quarterly Report", "Revenue grew"]))
            .await
            .unwrap(),
    );
    let out = pipeline
        .convert(pdf, &MarkdownOptions { maintain_format: true, model: None })
        .await
        .expect("conversion should succeed");

    assert!(out.markdown.to_lowercase().contains("quarterly"), "got: {}", out.markdown);
    assert!(!out.markdown.starts_with("```"));
    assert!(out.usage.input_tokens > 0);
    assert_eq!(out.usage.total_tokens, out.usage.input_tokens + out.usage.output_tokens);
    println!("--- BEGIN OUTPUT ---\n{}\n--- END OUTPUT ---", out.markdown);
}
