//! HTTP route handlers for the gateway.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::metrics::Metrics;
use super::request::RequestContext;
use super::response::ApiError;
use super::stream::{EntryStream, FieldStream};
use crate::journal::JournalOpener;
use crate::machine::{hostname_cleanup, MachineDescriptor, MachineProbe};
use crate::output::OutputMode;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub opener: Arc<dyn JournalOpener>,
    pub probe: Arc<dyn MachineProbe>,
    pub metrics: Arc<Metrics>,
    pub document_root: PathBuf,
}

/// Handle GET /
///
/// Redirects to the journal browser with a minimal HTML body for clients
/// that do not follow redirects.
pub async fn handle_root() -> Response {
    const TARGET: &str = "/browse";
    let page = format!(
        "<html><body>Please continue to the <a href=\"{TARGET}\">journal browser</a>.</body></html>"
    );
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::CONTENT_TYPE, "text/html"),
            (header::LOCATION, TARGET),
        ],
        page,
    )
        .into_response()
}

/// Handle GET /entries
///
/// Parses `Accept`, `Range` and the query arguments into a request context,
/// seeks the journal once, and attaches the entry stream generator as the
/// chunked response body.
pub async fn handle_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let mut journal = state
        .opener
        .open()
        .map_err(|err| ApiError::Server(format!("Failed to open journal: {err}")))?;

    let mut ctx = RequestContext::default();
    ctx.parse_accept(&headers);
    ctx.parse_range(&headers)
        .map_err(|_| ApiError::Parse("Failed to parse Range header.".into()))?;
    ctx.parse_arguments(query.as_deref().unwrap_or(""), journal.as_mut(), state.probe.as_ref())
        .map_err(|_| ApiError::Parse("Failed to parse URL arguments.".into()))?;

    if ctx.discrete {
        if ctx.cursor.is_none() {
            return Err(ApiError::Parse(
                "Discrete seeks require a cursor specification.".into(),
            ));
        }
        ctx.n_entries = Some(1);
    }

    ctx.seek(journal.as_mut())
        .map_err(|_| ApiError::Parse("Failed to seek in journal.".into()))?;

    let mime = ctx.mode.mime();
    let body = EntryStream::new(journal, ctx)
        .with_metrics(state.metrics.clone())
        .into_body();
    Ok(([(header::CONTENT_TYPE, mime)], body).into_response())
}

/// Handle GET /fields/{field}
///
/// Streams the distinct values the named field takes. The MIME type is
/// `application/json` only when the Accept header selected JSON; every
/// other mode is served as `text/plain`.
pub async fn handle_fields(
    State(state): State<AppState>,
    Path(field): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut journal = state
        .opener
        .open()
        .map_err(|err| ApiError::Server(format!("Failed to open journal: {err}")))?;

    let mut ctx = RequestContext::default();
    ctx.parse_accept(&headers);

    journal
        .query_unique(&field)
        .map_err(|_| ApiError::Parse("Failed to query unique fields.".into()))?;

    let mime = match ctx.mode {
        OutputMode::Json => OutputMode::Json.mime(),
        _ => OutputMode::Short.mime(),
    };
    let body = FieldStream::new(journal, ctx.mode)
        .with_metrics(state.metrics.clone())
        .into_body();
    Ok(([(header::CONTENT_TYPE, mime)], body).into_response())
}

/// Handle GET /browse
///
/// Serves the static browser asset from the document root.
pub async fn handle_browse(State(state): State<AppState>) -> Result<Response, ApiError> {
    let path = state.document_root.join("browse.html");
    let contents = tokio::fs::read(&path).await.map_err(|err| {
        ApiError::NotFound(format!("Failed to open file {}: {err}", path.display()))
    })?;
    Ok(([(header::CONTENT_TYPE, "text/html")], contents).into_response())
}

/// Handle GET /machine
///
/// Emits a single JSON document describing the host and the journal
/// extents. Numeric values are rendered as decimal strings.
pub async fn handle_machine(State(state): State<AppState>) -> Result<Response, ApiError> {
    let journal = state
        .opener
        .open()
        .map_err(|err| ApiError::Server(format!("Failed to open journal: {err}")))?;

    let machine_id = state
        .probe
        .machine_id()
        .map_err(|err| ApiError::Server(format!("Failed to determine machine ID: {err}")))?;
    let boot_id = state
        .probe
        .boot_id()
        .map_err(|err| ApiError::Server(format!("Failed to determine boot ID: {err}")))?;
    let hostname = state
        .probe
        .hostname()
        .map_err(|err| ApiError::Server(format!("Failed to determine hostname: {err}")))?;
    let usage = journal
        .usage()
        .map_err(|err| ApiError::Server(format!("Failed to determine disk usage: {err}")))?;
    let (cutoff_from, cutoff_to) = journal
        .cutoff_realtime()
        .map_err(|err| ApiError::Server(format!("Failed to determine journal cutoff: {err}")))?;

    let descriptor = MachineDescriptor {
        machine_id,
        boot_id,
        hostname: hostname_cleanup(&hostname),
        os_pretty_name: state
            .probe
            .os_pretty_name()
            .unwrap_or_else(|| "Linux".to_string()),
        virtualization: state.probe.virtualization(),
        usage: usage.to_string(),
        cutoff_from_realtime: cutoff_from.to_string(),
        cutoff_to_realtime: cutoff_to.to_string(),
    };

    let mut body = serde_json::to_string(&descriptor)
        .map_err(|err| ApiError::Server(format!("Failed to serialize machine document: {err}")))?;
    body.push('\n');
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Fallback for unknown URLs.
pub async fn handle_not_found() -> ApiError {
    ApiError::NotFound("Not found.".into())
}
