//! pdfium adapter: page rasterisation and embedded-text extraction.
//!
//! pdfium is a blocking C library, so every job runs on tokio's blocking
//! pool under the configured timeout. Each job binds the library, opens the
//! document from its scratch path, does its work and drops everything before
//! returning. No pdfium handle outlives a request.

use crate::adapters::PdfEngine;
use crate::config::PdfSettings;
use crate::error::ConvertError;
use crate::request::PageSelection;
use crate::scratch::ScratchFile;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// [`PdfEngine`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    settings: PdfSettings,
}

impl PdfiumEngine {
    pub fn new(settings: PdfSettings) -> Self {
        Self { settings }
    }

    /// Bind the library once to report a missing pdfium at startup.
    pub async fn probe(&self) -> Result<(), ConvertError> {
        let library = self.settings.library_path.clone();
        self.run_blocking("pdfium probe", move || bind(library.as_deref()).map(|_| ()))
            .await
    }

    /// Render every page at `dpi`, capped at `max_pixels` per edge.
    ///
    /// Returns `(page_index_0based, image)` in page order.
    pub async fn rasterise_all(
        &self,
        pdf: Arc<ScratchFile>,
        dpi: u32,
        max_pixels: u32,
    ) -> Result<Vec<(usize, DynamicImage)>, ConvertError> {
        let library = self.settings.library_path.clone();
        self.run_blocking("pdf rasterisation", move || {
            let pdfium = bind(library.as_deref())?;
            let document = open_document(&pdfium, pdf.path())?;
            let pages = document.pages();
            let total = pages.len() as usize;
            let config = render_config(dpi, max_pixels);
            info!("PDF loaded: {} pages", total);

            let mut images = Vec::with_capacity(total);
            for idx in 0..total {
                images.push((idx, render_one(&pages, idx, &config)?));
            }
            Ok(images)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, stage: &'static str, job: F) -> Result<T, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    {
        let secs = self.settings.timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), tokio::task::spawn_blocking(job)).await
        {
            Ok(joined) => joined.map_err(ConvertError::from).and_then(|r| r),
            Err(_) => Err(ConvertError::Timeout { stage, secs }),
        }
    }
}

#[async_trait]
impl PdfEngine for PdfiumEngine {
    async fn render_page(
        &self,
        pdf: Arc<ScratchFile>,
        page: usize,
        output: ScratchFile,
    ) -> Result<ScratchFile, ConvertError> {
        let library = self.settings.library_path.clone();
        let (dpi, max_pixels) = (self.settings.dpi, self.settings.max_rendered_pixels);

        self.run_blocking("pdf render", move || {
            let pdfium = bind(library.as_deref())?;
            let document = open_document(&pdfium, pdf.path())?;
            let pages = document.pages();
            let total = pages.len() as usize;
            if page == 0 || page > total {
                return Err(ConvertError::PageOutOfRange { page, total });
            }

            let image = render_one(&pages, page - 1, &render_config(dpi, max_pixels))?;
            image
                .save_with_format(output.path(), image::ImageFormat::Png)
                .map_err(|e| ConvertError::RasterisationFailed {
                    page,
                    detail: e.to_string(),
                })?;
            Ok(output)
        })
        .await
    }

    async fn extract_text(
        &self,
        pdf: Arc<ScratchFile>,
        selection: PageSelection,
    ) -> Result<String, ConvertError> {
        let library = self.settings.library_path.clone();

        self.run_blocking("pdf text extraction", move || {
            let pdfium = bind(library.as_deref())?;
            let document = open_document(&pdfium, pdf.path())?;
            let pages = document.pages();
            let total = pages.len() as usize;

            let indices = selection.to_indices(total);
            if let Some(max) = selection.max_page().filter(|&p| p > total) {
                if indices.is_empty() {
                    return Err(ConvertError::PageOutOfRange { page: max, total });
                }
            }

            let mut texts = Vec::with_capacity(indices.len());
            for idx in indices {
                let page = pages
                    .get(idx as PdfPageIndex)
                    .map_err(|e| ConvertError::CorruptPdf {
                        detail: format!("page {}: {:?}", idx + 1, e),
                    })?;
                let text = page.text().map_err(|e| ConvertError::CorruptPdf {
                    detail: format!("page {} text layer: {:?}", idx + 1, e),
                })?;
                texts.push(text.all());
            }
            debug!("Extracted text from {} page(s)", texts.len());
            Ok(texts.join("\n"))
        })
        .await
    }
}

/// Bind to an explicit library (file or directory) or the system search path.
fn bind(library: Option<&Path>) -> Result<Pdfium, ConvertError> {
    let bindings = match library {
        Some(path) => {
            let file: PathBuf = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            Pdfium::bind_to_library(&file)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.contains("Password") || detail.contains("password") {
            ConvertError::PasswordRequired
        } else {
            ConvertError::CorruptPdf { detail }
        }
    })
}

/// Scale from 72-point PDF units to `dpi`, then cap either edge.
fn render_config(dpi: u32, max_pixels: u32) -> PdfRenderConfig {
    PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32)
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    config: &PdfRenderConfig,
) -> Result<DynamicImage, ConvertError> {
    let failed = |e: PdfiumError| ConvertError::RasterisationFailed {
        page: idx + 1,
        detail: format!("{e:?}"),
    };
    let page = pages.get(idx as PdfPageIndex).map_err(failed)?;
    let bitmap = page.render_with_config(config).map_err(failed)?;
    let image = bitmap.as_image();
    debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
    Ok(image)
}
