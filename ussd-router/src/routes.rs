//! HTTP routes.
//!
//! The carrier callback is served on the configured path for both `GET` and
//! `POST`. Dispatch runs menu handlers synchronously, so it is moved off the
//! async workers with `spawn_blocking`. A body that cannot be read, including
//! one over [`MAX_BODY_BYTES`], closes the session like any other malformed
//! callback.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use ussd_common::config::HEALTH_PATH;

use crate::engine::Engine;
use crate::request::TransportRequest;
use crate::response::{format_reply, Disposition};

/// Largest callback body accepted. Gateway callbacks are a few hundred bytes.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub adapter: String,
}

/// Build the router serving `engine` on `path`.
pub fn build_router(engine: Arc<Engine>, path: &str) -> Router {
    Router::new()
        .route(path, get(ussd_handler).post(ussd_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn ussd_handler(
    State(engine): State<Arc<Engine>>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(
                status = %rejection.status(),
                error = %rejection,
                "Unreadable callback body"
            );
            return plain_text(format_reply(
                Disposition::End,
                &engine.messages().session_closed,
            ));
        }
    };
    let transport = TransportRequest::new(method, query, headers, body);

    let worker = Arc::clone(&engine);
    let reply = match tokio::task::spawn_blocking(move || worker.handle(&transport)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            format_reply(Disposition::End, &engine.messages().internal_error)
        }
    };

    plain_text(reply)
}

fn plain_text(reply: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reply,
    )
        .into_response()
}

async fn health_handler(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "ussd-router".into(),
        adapter: engine.adapter_name().into(),
    })
}
