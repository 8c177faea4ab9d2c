//! Request dispatch for the Jigyasa HTTP surface.
//!
//! # Responsibility
//! - Map `(method, path)` to one operation through an explicit route table.
//! - Resolve the bearer identity, run the use-case, and translate
//!   `ServiceError` into status codes and JSON bodies.
//!
//! # Invariants
//! - Dispatch is synchronous and never panics; callers run it on a blocking
//!   worker.
//! - Each dispatched request uses its own SQLite connection.
//! - Internal failures answer with a generic 500 body and are logged with
//!   full detail.

pub mod envelope;
mod handlers;
pub mod routes;

pub use envelope::{ApiRequest, ApiResponse, Method};
pub use routes::{resolve, Operation, Resolution, RouteMatch, ROUTES};

use handlers::Context;
use jigyasa_core::repo::account_repo::SqliteAccountRepository;
use jigyasa_core::service::auth_service::{AuthService, TokenPolicy};
use jigyasa_core::{open_db, AppConfig, PdfReportRenderer, ServiceError};
use log::{error, info, warn};
use rusqlite::Connection;
use std::time::Instant;

pub struct Api {
    config: AppConfig,
    tokens: TokenPolicy,
    renderer: PdfReportRenderer,
}

impl Api {
    /// Api with the bundled report font.
    pub fn new(config: AppConfig) -> Self {
        let tokens = TokenPolicy::from_config(&config);
        Self {
            config,
            tokens,
            renderer: PdfReportRenderer::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: PdfReportRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Opens a connection to the configured database and dispatches.
    pub fn dispatch(&self, request: &ApiRequest) -> ApiResponse {
        self.route_and_run(request, |route| {
            match open_db(&self.config.database_path) {
                Ok(conn) => self.execute(&conn, route, request),
                Err(err) => {
                    error!(
                        "event=http_request module=api status=error op={} error_code=db_unavailable error={}",
                        route.operation.name(),
                        err
                    );
                    ApiResponse::internal_error()
                }
            }
        })
    }

    /// Dispatches over a caller-provided connection.
    pub fn dispatch_with(&self, conn: &Connection, request: &ApiRequest) -> ApiResponse {
        self.route_and_run(request, |route| self.execute(conn, route, request))
    }

    fn route_and_run(
        &self,
        request: &ApiRequest,
        run: impl FnOnce(&RouteMatch) -> ApiResponse,
    ) -> ApiResponse {
        let started_at = Instant::now();
        let (op, response) = match resolve(request.method, &request.path) {
            Resolution::NotFound => ("none", ApiResponse::not_found()),
            Resolution::MethodNotAllowed => (
                "none",
                ApiResponse::method_not_allowed(request.method.as_str()),
            ),
            Resolution::Matched(route) if route.operation == Operation::Health => (
                route.operation.name(),
                handlers::health().unwrap_or_else(|_| ApiResponse::internal_error()),
            ),
            Resolution::Matched(route) => (route.operation.name(), run(&route)),
        };

        let status = if response.status < 400 { "ok" } else { "error" };
        info!(
            "event=http_request module=api status={} method={} op={} status_code={} duration_ms={}",
            status,
            request.method.as_str(),
            op,
            response.status,
            started_at.elapsed().as_millis()
        );
        response
    }

    fn execute(&self, conn: &Connection, route: &RouteMatch, request: &ApiRequest) -> ApiResponse {
        let auth = AuthService::new(SqliteAccountRepository::new(conn), self.tokens);
        let viewer = match auth.resolve_viewer(request.bearer_token()) {
            Ok(viewer) => viewer,
            Err(err) => return error_response(route.operation, &err),
        };
        let ctx = Context {
            conn,
            config: &self.config,
            tokens: self.tokens,
            renderer: &self.renderer,
            viewer,
        };
        match handlers::handle(&ctx, route, request) {
            Ok(response) => response,
            Err(err) => error_response(route.operation, &err),
        }
    }
}

fn error_response(operation: Operation, err: &ServiceError) -> ApiResponse {
    match err {
        ServiceError::IntegrityFailure(detail) => error!(
            "event=operation_failed module=api status=error op={} error_code=integrity_failure error={}",
            operation.name(),
            detail
        ),
        other => warn!(
            "event=operation_rejected module=api status=error op={} reason={}",
            operation.name(),
            other
        ),
    }
    ApiResponse::from(err)
}
