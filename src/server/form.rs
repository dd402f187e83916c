//! Form extraction for the conversion endpoints.
//!
//! [`ConversionForm`] accepts `multipart/form-data` (required for uploads)
//! and `application/x-www-form-urlencoded`, and turns the raw fields into a
//! validated [`ConversionRequest`]. Extraction failures are rejected with the
//! same envelope as every other error.

use crate::config::BrowserSettings;
use crate::error::ConvertError;
use crate::request::{
    ConversionRequest, HtmlSource, HtmlToImageRequest, MarkdownOptions, PageSelection, PdfUpload,
    Viewport,
};
use crate::server::envelope::{ApiError, RequestId};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use std::collections::HashMap;

/// Field names accepted for the uploaded PDF.
const FILE_FIELDS: [&str; 2] = ["source_file", "file"];

/// Raw text fields plus the optional uploaded file.
#[derive(Debug, Default)]
pub struct ConversionForm {
    fields: HashMap<String, String>,
    file: Option<PdfUpload>,
}

impl<S> FromRequest<S> for ConversionForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let id = req
            .extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| RequestId("-".into()));
        let reject = |msg: String| ApiError::new(id.clone(), ConvertError::MalformedRequest(msg));

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| reject(e.body_text()))?;
            parse_multipart(multipart).await.map_err(reject)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| reject(e.body_text()))?;
            Ok(ConversionForm { fields, file: None })
        } else {
            Err(reject(
                "expected multipart/form-data or application/x-www-form-urlencoded".into(),
            ))
        }
    }
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ConversionForm, String> {
    let mut form = ConversionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("failed to read form field: {e}"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if FILE_FIELDS.contains(&name.as_str()) {
            let filename = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("failed to read uploaded file: {e}"))?
                .to_vec();
            form.file = Some(PdfUpload::new(filename, bytes));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| format!("failed to read field '{name}': {e}"))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

impl ConversionForm {
    /// Build directly from parts; used by tests and non-HTTP callers.
    pub fn from_parts(fields: HashMap<String, String>, file: Option<PdfUpload>) -> Self {
        Self { fields, file }
    }

    /// First non-blank value among `names`.
    fn field(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.fields.get(*n))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    fn upload(&mut self) -> Result<PdfUpload, ConvertError> {
        self.file.take().ok_or(ConvertError::MissingField("source_file"))
    }

    pub fn html_to_image(self, browser: &BrowserSettings) -> Result<ConversionRequest, ConvertError> {
        let raw = self
            .fields
            .get("html_or_url")
            .ok_or(ConvertError::MissingField("html_or_url"))?;
        let source = HtmlSource::parse(raw)?;

        let viewport = match self.field(&["size"]) {
            Some(size) => size.parse::<Viewport>()?,
            None => browser.default_viewport,
        };
        let wait_ms = match self.field(&["wait_ms", "waitMs"]) {
            Some(v) => v.parse::<u64>().map_err(|_| ConvertError::InvalidOption {
                field: "wait_ms",
                reason: format!("'{v}' is not a number of milliseconds"),
            })?,
            None => 0,
        };

        Ok(ConversionRequest::HtmlToImage(HtmlToImageRequest {
            source,
            viewport,
            wait_ms: wait_ms.min(browser.max_wait_ms),
        }))
    }

    pub fn pdf_to_image(mut self) -> Result<ConversionRequest, ConvertError> {
        let page = match self.field(&["page"]) {
            Some(v) => v.parse::<usize>().map_err(|_| ConvertError::InvalidOption {
                field: "page",
                reason: format!("'{v}' is not a page number"),
            })?,
            None => 1,
        };
        Ok(ConversionRequest::PdfToImage {
            upload: self.upload()?,
            page,
        })
    }

    pub fn pdf_to_text(mut self) -> Result<ConversionRequest, ConvertError> {
        let pages = match self.field(&["pages"]) {
            Some(v) => v.parse::<PageSelection>()?,
            None => PageSelection::All,
        };
        Ok(ConversionRequest::PdfToText {
            upload: self.upload()?,
            pages,
        })
    }

    pub fn pdf_to_markdown(mut self) -> Result<ConversionRequest, ConvertError> {
        let maintain_format = match self.field(&["maintainFormat", "maintain_format"]) {
            Some(v) => parse_bool("maintainFormat", v)?,
            None => false,
        };
        let model = self.field(&["model"]).map(str::to_string);
        Ok(ConversionRequest::PdfToMarkdown {
            upload: self.upload()?,
            options: MarkdownOptions {
                maintain_format,
                model,
            },
        })
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConvertError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConvertError::InvalidOption {
            field,
            reason: format!("'{value}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)], file: Option<&[u8]>) -> ConversionForm {
        ConversionForm::from_parts(
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            file.map(|b| PdfUpload::new(Some("doc.pdf".into()), b.to_vec())),
        )
    }

    #[test]
    fn html_defaults_to_configured_viewport() {
        let req = form(&[("html_or_url", "https://example.com")], None)
            .html_to_image(&BrowserSettings::default())
            .unwrap();
        match req {
            ConversionRequest::HtmlToImage(r) => {
                assert_eq!(r.viewport, Viewport::DEFAULT);
                assert!(r.source.is_url());
                assert_eq!(r.wait_ms, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wait_is_capped() {
        let settings = BrowserSettings {
            max_wait_ms: 500,
            ..BrowserSettings::default()
        };
        let req = form(&[("html_or_url", "<p>hi</p>"), ("size", "800x600"), ("wait_ms", "9000")], None)
            .html_to_image(&settings)
            .unwrap();
        let ConversionRequest::HtmlToImage(r) = req else {
            panic!("wrong variant");
        };
        assert_eq!(r.wait_ms, 500);
        assert_eq!(r.viewport, Viewport { width: 800, height: 600 });
    }

    #[test]
    fn missing_html_field() {
        let err = form(&[], None).html_to_image(&BrowserSettings::default()).unwrap_err();
        assert!(matches!(err, ConvertError::MissingField("html_or_url")));
    }

    #[test]
    fn bad_size_is_business() {
        let err = form(&[("html_or_url", "<p>x</p>"), ("size", "big")], None)
            .html_to_image(&BrowserSettings::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_size");
    }

    #[test]
    fn missing_upload() {
        let err = form(&[], None).pdf_to_text().unwrap_err();
        assert!(matches!(err, ConvertError::MissingField("source_file")));
    }

    #[test]
    fn markdown_flag_aliases() {
        for key in ["maintainFormat", "maintain_format"] {
            let req = form(&[(key, "true"), ("model", "gpt-4.1")], Some(b"%PDF")).pdf_to_markdown().unwrap();
            let ConversionRequest::PdfToMarkdown { options, .. } = req else {
                panic!("wrong variant");
            };
            assert!(options.maintain_format);
            assert_eq!(options.model.as_deref(), Some("gpt-4.1"));
        }
        assert!(form(&[("maintainFormat", "maybe")], Some(b"%PDF")).pdf_to_markdown().is_err());
    }

    #[test]
    fn page_defaults_to_first() {
        let req = form(&[], Some(b"%PDF")).pdf_to_image().unwrap();
        assert!(matches!(req, ConversionRequest::PdfToImage { page: 1, .. }));
    }
}
