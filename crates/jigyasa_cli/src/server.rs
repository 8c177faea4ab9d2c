//! HTTP listener that forwards every request to `jigyasa_api`.
//!
//! # Invariants
//! - Dispatch runs on a blocking worker; the async runtime never touches
//!   SQLite.
//! - Request bodies are capped at `max_upload_bytes`.
//! - The schema is migrated before the listener binds, so per-request
//!   connections never race on a fresh database.

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use jigyasa_api::{Api, ApiRequest, ApiResponse, Method};
use jigyasa_core::{open_db, AppConfig, PdfReportRenderer};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run(config: AppConfig, addr: SocketAddr) -> Result<(), String> {
    open_db(&config.database_path).map_err(|err| format!("database open failed: {err}"))?;
    let renderer = match config.report_font.as_deref() {
        Some(path) => PdfReportRenderer::from_font_file(path).map_err(|err| err.to_string())?,
        None => PdfReportRenderer::default(),
    };

    let max_body = config.max_upload_bytes;
    let api = Arc::new(Api::new(config).with_renderer(renderer));
    let app = Router::new()
        .fallback(forward)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(api);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| format!("failed to bind {addr}: {err}"))?;
    info!("event=server_start module=app status=ok addr={addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| format!("server error: {err}"))?;

    info!("event=server_stop module=app status=ok");
    Ok(())
}

async fn forward(
    State(api): State<Arc<Api>>,
    method: axum::http::Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(method) = Method::parse(method.as_str()) else {
        return into_http(ApiResponse::method_not_allowed(method.as_str()));
    };

    let request = ApiRequest {
        method,
        path: uri.path().to_string(),
        query,
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
        body: body.to_vec(),
    };

    match tokio::task::spawn_blocking(move || api.dispatch(&request)).await {
        Ok(response) => into_http(response),
        Err(err) => {
            error!("event=http_request module=app status=error error_code=worker_failed error={err}");
            into_http(ApiResponse::internal_error())
        }
    }
}

fn into_http(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    for (name, value) in response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("event=signal_install module=app status=error error={err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("event=signal_install module=app status=error error={err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("event=shutdown module=app status=ok signal=ctrl_c"),
        _ = terminate => info!("event=shutdown module=app status=ok signal=terminate"),
    }
}
