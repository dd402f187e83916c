//! HTTP surface.
//!
//! | Route                           | Method | Payload                         |
//! |---------------------------------|--------|---------------------------------|
//! | `/v1/health`                    | GET    | `{status, version}`             |
//! | `/v1/browser/html/to-image`     | POST   | `{image_base64, image_type, width, height}` |
//! | `/v1/browser/pdf/to-image`      | POST   | same as above                   |
//! | `/v1/browser/pdf/to-text`       | POST   | `{text}`                        |
//! | `/v1/browser/pdf/to-markdown`   | POST   | `{text, token_usage}`           |
//!
//! Everything except health is wrapped in the [`envelope`] and answered with
//! HTTP 200, including unknown routes, wrong methods, oversized bodies and
//! handler panics.

use crate::orchestrator::Converter;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

pub mod envelope;
pub mod form;
pub mod handlers;
pub mod middleware;

pub use envelope::RequestId;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub converter: Converter,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        Self { converter }
    }
}

/// Build the full router with all layers.
pub fn router(state: AppState) -> Router {
    let config = state.converter.config();
    let body_limit = DefaultBodyLimit::max(config.max_upload_bytes);
    let enable_cors = config.enable_cors;

    let mut app = Router::new()
        .route(
            "/v1/health",
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .route(
            "/v1/browser/html/to-image",
            post(handlers::html_to_image).fallback(handlers::method_not_allowed),
        )
        .route(
            "/v1/browser/pdf/to-image",
            post(handlers::pdf_to_image).fallback(handlers::method_not_allowed),
        )
        .route(
            "/v1/browser/pdf/to-text",
            post(handlers::pdf_to_text).fallback(handlers::method_not_allowed),
        )
        .route(
            "/v1/browser/pdf/to-markdown",
            post(handlers::pdf_to_markdown).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(body_limit)
        .layer(CatchPanicLayer::custom(envelope::panic_response));

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(axum_middleware::from_fn(middleware::request_context))
        .with_state(state)
}
