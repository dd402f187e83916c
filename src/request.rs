//! Request and result model.
//!
//! A [`ConversionRequest`] is fully validated before any scratch artifact is
//! acquired: everything that can be rejected from the raw form values alone
//! (empty upload, wrong magic bytes, unparsable size, bare words where HTML
//! was expected) is rejected here as a business error.

use crate::error::ConvertError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

// ── HTML / URL input ─────────────────────────────────────────────────────

/// Minimum length for inline input that carries no markup at all.
const MIN_PLAIN_INLINE_LEN: usize = 5;

/// What the HTML endpoint was asked to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlSource {
    /// An `http://` or `https://` address the browser navigates to.
    Url(String),
    /// A document loaded into a blank page.
    Inline(String),
}

impl HtmlSource {
    /// Classify `html_or_url` by its scheme prefix and reject unusable input.
    pub fn parse(raw: &str) -> Result<Self, ConvertError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConvertError::MissingField("html_or_url"));
        }

        let lower = trimmed.to_ascii_lowercase();
        let rest = lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"));
        if let Some(rest) = rest {
            let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
            let host = authority.rsplit('@').next().unwrap_or_default();
            let host = host.split(':').next().unwrap_or_default();
            if host.is_empty() || trimmed.chars().any(char::is_whitespace) {
                return Err(ConvertError::InvalidHtmlOrUrl {
                    reason: format!("'{trimmed}' is not a valid URL"),
                });
            }
            return Ok(HtmlSource::Url(trimmed.to_string()));
        }

        if trimmed.chars().count() < MIN_PLAIN_INLINE_LEN && !trimmed.contains('<') {
            return Err(ConvertError::InvalidHtmlOrUrl {
                reason: "expected an http(s) URL or an HTML document".into(),
            });
        }
        Ok(HtmlSource::Inline(raw.to_string()))
    }

    pub fn is_url(&self) -> bool {
        matches!(self, HtmlSource::Url(_))
    }
}

/// Browser viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DEFAULT: Viewport = Viewport {
        width: 1080,
        height: 1920,
    };
    /// Larger viewports are refused; Chrome cannot allocate the surface.
    pub const MAX_EDGE: u32 = 16_384;
}

impl Default for Viewport {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = ConvertError;

    /// Parse `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConvertError::InvalidSize {
            input: s.to_string(),
        };
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 || width > Self::MAX_EDGE || height > Self::MAX_EDGE {
            return Err(invalid());
        }
        Ok(Viewport { width, height })
    }
}

/// A validated HTML/URL → image request.
#[derive(Debug, Clone)]
pub struct HtmlToImageRequest {
    pub source: HtmlSource,
    pub viewport: Viewport,
    /// Extra settle time after load, already capped by configuration.
    pub wait_ms: u64,
}

// ── PDF input ────────────────────────────────────────────────────────────

/// An uploaded PDF held in memory until the orchestrator adopts it into a
/// scratch file.
#[derive(Clone)]
pub struct PdfUpload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PdfUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfUpload")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PdfUpload {
    pub fn new(filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self { filename, bytes }
    }

    /// Cheap structural check: non-empty and starts with `%PDF`.
    ///
    /// Deeper corruption is only discovered when pdfium opens the file.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.bytes.is_empty() {
            return Err(ConvertError::EmptyFile);
        }
        if !self.bytes.starts_with(b"%PDF") {
            let n = self.bytes.len().min(4);
            return Err(ConvertError::NotAPdf {
                magic: self.bytes[..n].to_vec(),
            });
        }
        Ok(())
    }
}

/// Specifies which pages of the PDF to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Highest page number the selection names, if bounded.
    pub fn max_page(&self) -> Option<usize> {
        match self {
            PageSelection::All => None,
            PageSelection::Single(p) => Some(*p),
            PageSelection::Range(_, end) => Some(*end),
            PageSelection::Set(pages) => pages.iter().copied().max(),
        }
    }
}

impl FromStr for PageSelection {
    type Err = ConvertError;

    /// Accepts `all`, `5`, `2-4` and `1,3,5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConvertError::InvalidOption {
            field: "pages",
            reason,
        };
        let page = |p: &str| -> Result<usize, ConvertError> {
            let n: usize = p
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a page number", p.trim())))?;
            if n < 1 {
                return Err(invalid("pages are 1-indexed".into()));
            }
            Ok(n)
        };

        let s = s.trim().to_lowercase();
        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (page(start)?, page(end)?);
            if start > end {
                return Err(invalid(format!("range {start}-{end} is reversed")));
            }
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            let pages = s.split(',').map(page).collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }
        Ok(PageSelection::Single(page(&s)?))
    }
}

/// Options for PDF → Markdown.
#[derive(Debug, Clone, Default)]
pub struct MarkdownOptions {
    /// Convert pages in order, passing each page's Markdown as context for the next.
    pub maintain_format: bool,
    /// Overrides the configured model for this request.
    pub model: Option<String>,
}

// ── Requests and results ────────────────────────────────────────────────

/// One validated conversion, tagged by the endpoint that received it.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    HtmlToImage(HtmlToImageRequest),
    PdfToImage {
        upload: PdfUpload,
        /// 1-indexed.
        page: usize,
    },
    PdfToText {
        upload: PdfUpload,
        pages: PageSelection,
    },
    PdfToMarkdown {
        upload: PdfUpload,
        options: MarkdownOptions,
    },
}

impl ConversionRequest {
    /// Short operation label for logs.
    pub fn operation(&self) -> &'static str {
        match self {
            ConversionRequest::HtmlToImage(_) => "html_to_image",
            ConversionRequest::PdfToImage { .. } => "pdf_to_image",
            ConversionRequest::PdfToText { .. } => "pdf_to_text",
            ConversionRequest::PdfToMarkdown { .. } => "pdf_to_markdown",
        }
    }

    /// Shape checks that need no external capability.
    pub fn validate(&self) -> Result<(), ConvertError> {
        match self {
            ConversionRequest::HtmlToImage(_) => Ok(()),
            ConversionRequest::PdfToImage { upload, page } => {
                upload.validate()?;
                if *page == 0 {
                    return Err(ConvertError::InvalidOption {
                        field: "page",
                        reason: "pages are 1-indexed".into(),
                    });
                }
                Ok(())
            }
            ConversionRequest::PdfToText { upload, .. }
            | ConversionRequest::PdfToMarkdown { upload, .. } => upload.validate(),
        }
    }
}

/// Token accounting for one AI conversion, summed over pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
    pub cached_tokens: usize,
    pub model: String,
    /// `None` when the model is absent from the price table.
    pub estimated_cost_usd: Option<f64>,
}

/// What one adapter produced for one request.
#[derive(Debug, Clone)]
pub enum ConversionResult {
    Image {
        bytes: Vec<u8>,
        mime: &'static str,
        width: u32,
        height: u32,
    },
    Text(String),
    TextWithUsage {
        text: String,
        usage: TokenUsage,
    },
}
