//! HTTP surface
//!
//! Plain-text endpoints for agents (submit, hash) and JSON/CSV report
//! endpoints for readers. Every request runs inside a span carrying a
//! fresh request id.

pub mod auth;

pub use auth::{AllowAll, Authenticator, Grant, TokenAuthenticator};

use crate::config::Config;
use crate::db::InventoryDb;
use crate::error::{Error, Result};
use crate::export::{export_csv, CsvExport};
use crate::present::{
    application_detail, application_list, inventory_list, ApplicationDetailView,
    ApplicationListView, InventoryListView, PageParams, PageRequest,
};
use crate::query::FieldFilter;
use crate::scope::{ReportContext, Scope};
use crate::submit::{inventory_hash, submit_inventory, SubmitForm};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: InventoryDb,
    pub config: Arc<Config>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// State using bearer tokens from the config's `[access]` table
    pub fn new(db: InventoryDb, config: Config) -> Self {
        let auth = Arc::new(TokenAuthenticator::new(config.access.clone()));
        Self {
            db,
            config: Arc::new(config),
            auth,
        }
    }

    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = auth;
        self
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) | Error::MethodNotAllowed(_) | Error::InvalidScope(_) => {
                StatusCode::NOT_FOUND
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::Decode(_) | Error::Parse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
            return (status, "Internal server error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/inventory/submit/", post(submit).fallback(no_post))
        .route("/inventory/hash/", get(hash_without_serial))
        .route("/inventory/hash/:serial/", get(hash))
        .route(
            "/inventory/applications/:group_type/:group_id/",
            get(applications),
        )
        .route(
            "/inventory/application/:group_type/:group_id/:application_id/",
            get(application),
        )
        .route(
            "/inventory/list/:group_type/:group_id/:application_id/:field_type/:field_value/",
            get(inventory),
        )
        .route(
            "/inventory/csv_export/:group_type/:group_id/:application_id/:field_type/:field_value/",
            get(csv_export),
        )
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// ===== Agent endpoints =====

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SubmitForm>,
) -> Result<String> {
    let request_id = Uuid::new_v4();
    let credential = auth::machine_credential(&headers);
    async move {
        let outcome = submit_inventory(
            &state.db,
            &state.config.submission,
            &form,
            credential.as_deref(),
        )
        .await?;
        Ok(outcome.message())
    }
    .instrument(info_span!("submit", request_id = %request_id))
    .await
}

async fn no_post() -> Error {
    Error::MethodNotAllowed("No POST data sent".to_string())
}

async fn hash_without_serial(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<String> {
    lookup_hash(state, headers, None).await
}

async fn hash(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(serial): Path<String>,
) -> Result<String> {
    lookup_hash(state, headers, Some(serial)).await
}

async fn lookup_hash(state: AppState, headers: HeaderMap, serial: Option<String>) -> Result<String> {
    let request_id = Uuid::new_v4();
    let credential = auth::machine_credential(&headers);
    async move {
        let lookup = inventory_hash(
            &state.db,
            &state.config.submission,
            serial.as_deref(),
            credential.as_deref(),
        )
        .await?;
        Ok(lookup.body().to_string())
    }
    .instrument(info_span!("hash", request_id = %request_id))
    .await
}

// ===== Report endpoints =====

/// Authenticate, resolve the scope and check the caller may read it
async fn report_context(
    state: &AppState,
    headers: &HeaderMap,
    group_type: &str,
    group_id: i64,
    request_id: Uuid,
) -> Result<ReportContext> {
    let grant = state.auth.authenticate(headers)?;
    let scope = Scope::from_parts(group_type, group_id)?;
    let ctx = ReportContext::resolve_for(&state.db, scope, request_id).await?;
    if !grant.permits(ctx.business_unit.as_ref()) {
        warn!(scope = ?scope, "Report access denied");
        return Err(Error::PermissionDenied(
            "Not allowed to view this group".to_string(),
        ));
    }
    Ok(ctx)
}

fn report_span(route: &'static str, request_id: Uuid) -> tracing::Span {
    info_span!("report", route, request_id = %request_id)
}

async fn applications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((group_type, group_id)): Path<(String, i64)>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApplicationListView>> {
    let request_id = Uuid::new_v4();
    async move {
        let ctx = report_context(&state, &headers, &group_type, group_id, request_id).await?;
        let page = PageRequest::new(params, &state.config.reports);
        Ok(Json(application_list(&state.db, &ctx, page).await?))
    }
    .instrument(report_span("applications", request_id))
    .await
}

async fn application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((group_type, group_id, application_id)): Path<(String, i64, i64)>,
) -> Result<Json<ApplicationDetailView>> {
    let request_id = Uuid::new_v4();
    async move {
        let ctx = report_context(&state, &headers, &group_type, group_id, request_id).await?;
        Ok(Json(application_detail(&state.db, &ctx, application_id).await?))
    }
    .instrument(report_span("application", request_id))
    .await
}

async fn inventory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((group_type, group_id, application_id, field_type, field_value)): Path<(
        String,
        i64,
        i64,
        String,
        String,
    )>,
    Query(params): Query<PageParams>,
) -> Result<Json<InventoryListView>> {
    let request_id = Uuid::new_v4();
    async move {
        let ctx = report_context(&state, &headers, &group_type, group_id, request_id).await?;
        let field = FieldFilter::from_parts(&field_type, &field_value);
        let page = PageRequest::new(params, &state.config.reports);
        Ok(Json(
            inventory_list(&state.db, &ctx, application_id, field, page).await?,
        ))
    }
    .instrument(report_span("inventory", request_id))
    .await
}

async fn csv_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((group_type, group_id, application_id, field_type, field_value)): Path<(
        String,
        i64,
        i64,
        String,
        String,
    )>,
) -> Result<Response> {
    let request_id = Uuid::new_v4();
    async move {
        let ctx = report_context(&state, &headers, &group_type, group_id, request_id).await?;
        let field = FieldFilter::from_parts(&field_type, &field_value);
        let export = export_csv(
            &state.db,
            &ctx,
            &state.config.export.filename_base,
            application_id,
            &field,
        )
        .await?;
        Ok(csv_response(export))
    }
    .instrument(report_span("csv_export", request_id))
    .await
}

fn csv_response(export: CsvExport) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", export.filename);
    (
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response()
}
