//! Error types for browser-tools.
//!
//! Every failure in the service is a [`ConvertError`], and every variant
//! belongs to exactly one [`ErrorKind`]:
//!
//! * **Business**: the caller sent something we cannot convert (bad URL,
//!   corrupt PDF, page out of range, missing form field). The message is
//!   safe to show verbatim and the event is not a service fault.
//!
//! * **Internal**: the service or one of its dependencies failed (browser
//!   crash, missing AI credential, upstream API error, filesystem trouble).
//!   These are logged with full detail. Callers get a fixed message that
//!   never carries upstream text: a timeout or rate limit says so, an
//!   upstream model failure names only the provider, everything else is
//!   "internal error".
//!
//! Adapters never let a library error escape unclassified: they map into one
//! of these variants at their boundary.

use std::path::PathBuf;
use thiserror::Error;

/// The two error classes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Business,
    Internal,
}

/// All errors produced while handling a conversion request.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Business: request shape ───────────────────────────────────────────
    /// A required form field is absent or empty.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The request body could not be parsed as a form.
    #[error("invalid request: {0}")]
    MalformedRequest(String),

    /// `html_or_url` is neither a usable URL nor an HTML document.
    #[error("invalid html_or_url: {reason}")]
    InvalidHtmlOrUrl { reason: String },

    /// `size` is not `WIDTHxHEIGHT` with positive integers.
    #[error("Invalid size format '{input}'. Expected WIDTHxHEIGHT.")]
    InvalidSize { input: String },

    /// A numeric or page-selection option could not be parsed.
    #[error("invalid value for '{field}': {reason}")]
    InvalidOption { field: &'static str, reason: String },

    /// The route does not exist.
    #[error("no route for {path}")]
    RouteNotFound { path: String },

    /// The route exists but not for this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    // ── Business: PDF content ─────────────────────────────────────────────
    /// The uploaded file has zero bytes.
    #[error("uploaded file is empty")]
    EmptyFile,

    /// The upload does not start with the `%PDF` magic bytes.
    #[error("file is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// The PDF is encrypted; passwords are not accepted by this service.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// The requested page does not exist.
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Internal: adapters ────────────────────────────────────────────────
    /// Chrome failed to launch, navigate, or capture.
    #[error("browser failure: {0}")]
    Browser(String),

    /// pdfium failed after the document was opened successfully.
    #[error("rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The pdfium shared library could not be bound.
    #[error("failed to bind to pdfium library: {0}")]
    PdfiumBindingFailed(String),

    /// An adapter exceeded its wall-clock budget.
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    // ── Internal: AI provider ─────────────────────────────────────────────
    /// No credential or an unusable provider configuration.
    #[error("AI provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider answered 429.
    #[error("rate limited by AI provider '{provider}'")]
    RateLimited { provider: String },

    /// The provider returned any other error. `message` is upstream text and
    /// only reaches the logs.
    #[error("AI provider '{provider}' request failed: {message}")]
    LlmApiError { provider: String, message: String },

    // ── Internal: infrastructure ──────────────────────────────────────────
    /// Scratch-file or other filesystem failure.
    #[error("{context} '{path}': {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error, including panics in blocking tasks.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        use ConvertError::*;
        match self {
            MissingField(_)
            | MalformedRequest(_)
            | InvalidHtmlOrUrl { .. }
            | InvalidSize { .. }
            | InvalidOption { .. }
            | RouteNotFound { .. }
            | MethodNotAllowed { .. }
            | EmptyFile
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired
            | PageOutOfRange { .. } => ErrorKind::Business,
            Browser(_)
            | RasterisationFailed { .. }
            | PdfiumBindingFailed(_)
            | Timeout { .. }
            | ProviderNotConfigured { .. }
            | RateLimited { .. }
            | LlmApiError { .. }
            | Io { .. }
            | InvalidConfig(_)
            | Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_business(&self) -> bool {
        self.kind() == ErrorKind::Business
    }

    /// Stable machine-readable code for the envelope.
    pub fn code(&self) -> &'static str {
        use ConvertError::*;
        match self {
            MissingField(_) => "missing_field",
            MalformedRequest(_) => "invalid_request",
            InvalidHtmlOrUrl { .. } => "invalid_html_or_url",
            InvalidSize { .. } => "invalid_size",
            InvalidOption { .. } => "invalid_option",
            RouteNotFound { .. } => "not_found",
            MethodNotAllowed { .. } => "method_not_allowed",
            EmptyFile => "empty_file",
            NotAPdf { .. } | CorruptPdf { .. } => "invalid_pdf",
            PasswordRequired => "pdf_encrypted",
            PageOutOfRange { .. } => "page_out_of_range",
            Browser(_) => "browser_error",
            RasterisationFailed { .. } => "render_error",
            PdfiumBindingFailed(_) => "pdf_engine_unavailable",
            Timeout { .. } => "timeout",
            ProviderNotConfigured { .. } => "ai_not_configured",
            RateLimited { .. } => "rate_limited",
            LlmApiError { .. } => "ai_upstream_error",
            Io { .. } | InvalidConfig(_) | Internal(_) => "internal_error",
        }
    }

    /// The message shown to the caller.
    ///
    /// Business errors are shown as-is. Internal errors collapse to a generic
    /// message, except the few whose text tells the caller what to do next.
    pub fn public_message(&self) -> String {
        match self {
            e if e.is_business() => e.to_string(),
            ConvertError::RateLimited { .. } | ConvertError::Timeout { .. } => self.to_string(),
            ConvertError::LlmApiError { provider, .. } => {
                format!("AI provider '{provider}' request failed")
            }
            _ => "internal error".to_string(),
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for ConvertError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            ConvertError::Internal(format!("conversion task panicked: {e}"))
        } else {
            ConvertError::Internal(format!("conversion task cancelled: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_business() {
        assert_eq!(ConvertError::EmptyFile.kind(), ErrorKind::Business);
        assert_eq!(
            ConvertError::NotAPdf { magic: b"GIF8".to_vec() }.kind(),
            ErrorKind::Business
        );
        assert_eq!(
            ConvertError::PageOutOfRange { page: 9, total: 2 }.kind(),
            ErrorKind::Business
        );
        assert!(ConvertError::MissingField("html_or_url").is_business());
    }

    #[test]
    fn dependency_errors_are_internal() {
        let e = ConvertError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "no API key".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert_eq!(ConvertError::Browser("crashed".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn business_message_is_verbatim() {
        let e = ConvertError::PageOutOfRange { page: 4, total: 3 };
        assert_eq!(e.public_message(), "page 4 is out of range (document has 3 pages)");
    }

    #[test]
    fn internal_message_is_redacted() {
        let e = ConvertError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "OPENAI_API_KEY unset".into(),
        };
        assert_eq!(e.public_message(), "internal error");
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn rate_limit_message_is_exposed() {
        let e = ConvertError::RateLimited {
            provider: "openai".into(),
        };
        assert!(e.public_message().contains("rate limited"));
    }

    #[test]
    fn upstream_text_stays_out_of_the_public_message() {
        let e = ConvertError::LlmApiError {
            provider: "openai".into(),
            message: "500 from https://gateway.internal/v1 (org org-123)".into(),
        };
        assert_eq!(e.public_message(), "AI provider 'openai' request failed");
        assert!(e.to_string().contains("gateway.internal"));
        assert_eq!(e.code(), "ai_upstream_error");
    }

    #[test]
    fn timeout_display() {
        let e = ConvertError::Timeout {
            stage: "browser render",
            secs: 60,
        };
        assert_eq!(e.to_string(), "browser render timed out after 60s");
        assert_eq!(e.code(), "timeout");
    }

    #[test]
    fn corrupt_and_not_pdf_share_code() {
        assert_eq!(ConvertError::NotAPdf { magic: vec![] }.code(), "invalid_pdf");
        assert_eq!(
            ConvertError::CorruptPdf { detail: "x".into() }.code(),
            "invalid_pdf"
        );
    }
}
