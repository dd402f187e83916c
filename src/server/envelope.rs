//! Response envelope.
//!
//! Every conversion endpoint answers HTTP 200 with one of two JSON shapes:
//!
//! ```json
//! {"success": true,  "data": { ... }}
//! {"success": false, "error": {"kind": "business", "code": "invalid_pdf", "message": "..."},
//!  "request_id": "..."}
//! ```
//!
//! Callers detect failure from `success`, never from the status code.

use crate::error::{ConvertError, ErrorKind};
use crate::pipeline::encode::to_base64;
use crate::request::{ConversionResult, TokenUsage};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::any::Any;
use tracing::{error, warn};

/// Correlation id for one HTTP request, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Success ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub image_base64: String,
    pub image_type: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct TextPayload {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MarkdownPayload {
    pub text: String,
    pub token_usage: TokenUsage,
}

fn wrong_shape(expected: &str) -> ConvertError {
    ConvertError::Internal(format!("adapter returned a non-{expected} result"))
}

impl TryFrom<ConversionResult> for ImagePayload {
    type Error = ConvertError;

    fn try_from(result: ConversionResult) -> Result<Self, Self::Error> {
        match result {
            ConversionResult::Image {
                bytes,
                mime,
                width,
                height,
            } => Ok(ImagePayload {
                image_base64: to_base64(&bytes),
                image_type: mime.strip_prefix("image/").unwrap_or(mime),
                width,
                height,
            }),
            _ => Err(wrong_shape("image")),
        }
    }
}

impl TryFrom<ConversionResult> for TextPayload {
    type Error = ConvertError;

    fn try_from(result: ConversionResult) -> Result<Self, Self::Error> {
        match result {
            ConversionResult::Text(text) => Ok(TextPayload { text }),
            _ => Err(wrong_shape("text")),
        }
    }
}

impl TryFrom<ConversionResult> for MarkdownPayload {
    type Error = ConvertError;

    fn try_from(result: ConversionResult) -> Result<Self, Self::Error> {
        match result {
            ConversionResult::TextWithUsage { text, usage } => Ok(MarkdownPayload {
                text,
                token_usage: usage,
            }),
            _ => Err(wrong_shape("markdown")),
        }
    }
}

// ── Failure ──────────────────────────────────────────────────────────────

/// A classified failure bound to the request it belongs to.
#[derive(Debug)]
pub struct ApiError {
    request_id: Option<RequestId>,
    error: ConvertError,
}

impl ApiError {
    pub fn new(request_id: RequestId, error: ConvertError) -> Self {
        Self {
            request_id: Some(request_id),
            error,
        }
    }

    /// For failures raised where the request id is not reachable.
    pub fn detached(error: ConvertError) -> Self {
        Self {
            request_id: None,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: ErrorDetail<'a>,
    request_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    kind: ErrorKind,
    code: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let id = self.request_id.as_ref().map(|r| r.0.as_str()).unwrap_or("-");
        let e = &self.error;
        match e.kind() {
            ErrorKind::Business => warn!(request_id = %id, code = e.code(), "{}", e),
            ErrorKind::Internal => error!(request_id = %id, code = e.code(), "{}", detailed(e)),
        }

        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                kind: e.kind(),
                code: e.code(),
                message: e.public_message(),
            },
            request_id: self.request_id.as_ref().map(|r| r.0.as_str()),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Display plus the `source()` chain, for operator logs.
fn detailed(e: &ConvertError) -> String {
    let mut out = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

/// Response for a handler panic caught by `CatchPanicLayer`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    ApiError::detached(ConvertError::Internal(format!("handler panicked: {detail}"))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn business_error_is_200_with_verbatim_message() {
        let res = ApiError::new(RequestId("abc".into()), ConvertError::EmptyFile).into_response();
        assert_eq!(res.status(), StatusCode::OK);

        let json = body_json(res).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "business");
        assert_eq!(json["error"]["code"], "empty_file");
        assert_eq!(json["error"]["message"], "uploaded file is empty");
        assert_eq!(json["request_id"], "abc");
    }

    #[tokio::test]
    async fn internal_error_is_redacted() {
        let err = ConvertError::io(
            "writing scratch file",
            "/tmp/x",
            std::io::Error::other("disk full"),
        );
        let json = body_json(ApiError::new(RequestId("r1".into()), err).into_response()).await;
        assert_eq!(json["error"]["kind"], "internal");
        assert_eq!(json["error"]["message"], "internal error");
    }

    #[tokio::test]
    async fn success_wraps_data() {
        let res = ApiResponse::ok(TextPayload { text: "hi".into() }).into_response();
        let json = body_json(res).await;
        assert_eq!(json, serde_json::json!({"success": true, "data": {"text": "hi"}}));
    }

    #[test]
    fn image_payload_from_result() {
        let payload = ImagePayload::try_from(ConversionResult::Image {
            bytes: vec![1, 2, 3],
            mime: "image/png",
            width: 4,
            height: 5,
        })
        .unwrap();
        assert_eq!(payload.image_type, "png");
        assert_eq!(payload.image_base64, "AQID");
    }

    #[test]
    fn mismatched_result_is_internal() {
        let err = TextPayload::try_from(ConversionResult::Image {
            bytes: vec![],
            mime: "image/png",
            width: 0,
            height: 0,
        })
        .unwrap_err();
        assert!(!err.is_business());
    }

    #[tokio::test]
    async fn panic_payload_becomes_internal_envelope() {
        let res = panic_response(Box::new("boom"));
        let json = body_json(res).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "internal_error");
    }
}
