//! Per-request context: correlation id and the access log line.

use crate::server::envelope::RequestId;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Inbound ids longer than this, or with non-visible characters, are replaced.
const MAX_INBOUND_ID_LEN: usize = 128;

/// Attach a [`RequestId`] (inbound `X-Request-ID` or a fresh UUID), echo it
/// on the response, and log `http_request [status] METHOD uri - N.NNms`.
pub async fn request_context(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_acceptable_id(v))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let mut res = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        request_id = %id,
        "http_request [{}] {} {} - {:.2}ms",
        res.status().as_u16(),
        method,
        uri,
        elapsed_ms
    );
    res
}

fn is_acceptable_id(v: &str) -> bool {
    !v.is_empty() && v.len() <= MAX_INBOUND_ID_LEN && v.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_id_filter() {
        assert!(is_acceptable_id("req-123"));
        assert!(!is_acceptable_id(""));
        assert!(!is_acceptable_id("has space"));
        assert!(!is_acceptable_id(&"x".repeat(200)));
    }
}
