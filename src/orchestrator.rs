//! Request orchestration.
//!
//! [`Converter::handle`] drives one request through
//! `Received → Validating → Processing → Responding → Cleaned-up`:
//!
//! 1. **Validating**: shape checks on the request; a failure here returns a
//!    business error before any scratch artifact exists.
//! 2. **Processing**: adopt the upload and/or acquire an output file, then
//!    call exactly one adapter under its configured timeout.
//! 3. **Responding**: read the artifact into a [`ConversionResult`].
//! 4. **Cleaned-up**: every guard acquired in step 2 is dropped when the
//!    handler returns, whichever way it returns.

use crate::adapters::{HtmlRenderer, MarkdownPipeline, PdfEngine};
use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::request::{
    ConversionRequest, ConversionResult, HtmlToImageRequest, MarkdownOptions, PageSelection,
    PdfUpload,
};
use crate::scratch::{ScratchFile, ScratchSpace, ScratchStats};
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared entry point for all conversions. Cheap to clone.
#[derive(Clone)]
pub struct Converter {
    config: Arc<ServiceConfig>,
    scratch: ScratchSpace,
    html: Arc<dyn HtmlRenderer>,
    pdf: Arc<dyn PdfEngine>,
    markdown: Arc<dyn MarkdownPipeline>,
}

impl Converter {
    pub fn new(
        config: Arc<ServiceConfig>,
        scratch: ScratchSpace,
        html: Arc<dyn HtmlRenderer>,
        pdf: Arc<dyn PdfEngine>,
        markdown: Arc<dyn MarkdownPipeline>,
    ) -> Self {
        Self {
            config,
            scratch,
            html,
            pdf,
            markdown,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn scratch_stats(&self) -> ScratchStats {
        self.scratch.stats()
    }

    /// Run one conversion to completion.
    pub async fn handle(&self, request: ConversionRequest) -> Result<ConversionResult, ConvertError> {
        let op = request.operation();
        let start = Instant::now();
        request.validate()?;
        debug!("{}: validated", op);

        let result = match request {
            ConversionRequest::HtmlToImage(req) => self.html_to_image(req).await,
            ConversionRequest::PdfToImage { upload, page } => self.pdf_to_image(upload, page).await,
            ConversionRequest::PdfToText { upload, pages } => self.pdf_to_text(upload, pages).await,
            ConversionRequest::PdfToMarkdown { upload, options } => {
                self.pdf_to_markdown(upload, options).await
            }
        };

        if result.is_ok() {
            info!("{}: completed in {:.2?}", op, start.elapsed());
        }
        result
    }

    async fn html_to_image(&self, req: HtmlToImageRequest) -> Result<ConversionResult, ConvertError> {
        let output = self.scratch.acquire("screenshot", "png").await?;
        let budget = self.config.browser_timeout();
        let output = bounded("browser render", budget, self.html.screenshot(&req, output)).await?;
        image_result(&output).await
    }

    async fn pdf_to_image(&self, upload: PdfUpload, page: usize) -> Result<ConversionResult, ConvertError> {
        let pdf = Arc::new(self.adopt(&upload).await?);
        let output = self.scratch.acquire("page", "png").await?;
        let budget = self.config.pdf_timeout();
        let output = bounded("pdf render", budget, self.pdf.render_page(pdf, page, output)).await?;
        image_result(&output).await
    }

    async fn pdf_to_text(
        &self,
        upload: PdfUpload,
        pages: PageSelection,
    ) -> Result<ConversionResult, ConvertError> {
        let pdf = Arc::new(self.adopt(&upload).await?);
        let budget = self.config.pdf_timeout();
        let text = bounded("pdf text extraction", budget, self.pdf.extract_text(pdf, pages)).await?;
        Ok(ConversionResult::Text(text))
    }

    async fn pdf_to_markdown(
        &self,
        upload: PdfUpload,
        options: MarkdownOptions,
    ) -> Result<ConversionResult, ConvertError> {
        let pdf = Arc::new(self.adopt(&upload).await?);
        let budget = self.config.ai_timeout();
        let out = bounded("markdown conversion", budget, self.markdown.convert(pdf, &options)).await?;
        Ok(ConversionResult::TextWithUsage {
            text: out.markdown,
            usage: out.usage,
        })
    }

    async fn adopt(&self, upload: &PdfUpload) -> Result<ScratchFile, ConvertError> {
        self.scratch.adopt("upload", "pdf", &upload.bytes).await
    }
}

/// Run one adapter call under `budget`. A call that overruns is dropped,
/// which releases every scratch guard it holds.
async fn bounded<T>(
    stage: &'static str,
    budget: Duration,
    call: impl Future<Output = Result<T, ConvertError>>,
) -> Result<T, ConvertError> {
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} exceeded {:?}, cancelled", stage, budget);
            Err(ConvertError::Timeout {
                stage,
                secs: budget.as_secs(),
            })
        }
    }
}

/// Read a PNG artifact and its pixel dimensions.
async fn image_result(file: &ScratchFile) -> Result<ConversionResult, ConvertError> {
    let bytes = file.read().await?;
    let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| ConvertError::io("probing image", file.path(), e))?
        .into_dimensions()
        .map_err(|e| ConvertError::Internal(format!("adapter produced an unreadable image: {e}")))?;
    Ok(ConversionResult::Image {
        bytes,
        mime: "image/png",
        width,
        height,
    })
}
