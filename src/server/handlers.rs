//! Route handlers. Each one extracts the form, builds a typed request,
//! hands it to the [`Converter`](crate::orchestrator::Converter) and wraps
//! the outcome in the envelope.

use crate::error::ConvertError;
use crate::request::{ConversionRequest, ConversionResult};
use crate::server::envelope::{
    ApiError, ApiResponse, ImagePayload, MarkdownPayload, RequestId, TextPayload,
};
use crate::server::form::ConversionForm;
use crate::server::AppState;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /v1/health`. Not enveloped, touches no adapter.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn html_to_image(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    form: ConversionForm,
) -> Response {
    let request = form.html_to_image(&state.converter.config().browser);
    run::<ImagePayload>(&state, id, request).await
}

pub async fn pdf_to_image(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    form: ConversionForm,
) -> Response {
    run::<ImagePayload>(&state, id, form.pdf_to_image()).await
}

pub async fn pdf_to_text(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    form: ConversionForm,
) -> Response {
    run::<TextPayload>(&state, id, form.pdf_to_text()).await
}

pub async fn pdf_to_markdown(
    State(state): State<AppState>,
    Extension(id): Extension<RequestId>,
    form: ConversionForm,
) -> Response {
    run::<MarkdownPayload>(&state, id, form.pdf_to_markdown()).await
}

async fn run<P>(
    state: &AppState,
    id: RequestId,
    request: Result<ConversionRequest, ConvertError>,
) -> Response
where
    P: Serialize + TryFrom<ConversionResult, Error = ConvertError>,
{
    let outcome = match request {
        Ok(request) => state.converter.handle(request).await.and_then(P::try_from),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(payload) => ApiResponse::ok(payload).into_response(),
        Err(e) => ApiError::new(id, e).into_response(),
    }
}

/// Router fallback for unknown paths.
pub async fn not_found(Extension(id): Extension<RequestId>, uri: Uri) -> ApiError {
    ApiError::new(
        id,
        ConvertError::RouteNotFound {
            path: uri.path().to_string(),
        },
    )
}

/// Method fallback for known paths.
pub async fn method_not_allowed(
    Extension(id): Extension<RequestId>,
    method: Method,
    uri: Uri,
) -> ApiError {
    ApiError::new(
        id,
        ConvertError::MethodNotAllowed {
            method: method.to_string(),
            path: uri.path().to_string(),
        },
    )
}
