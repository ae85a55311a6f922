use std::{net::SocketAddr, path::Path as FsPath, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use session::{parse_time_zone, SurveyContext};
use shared::{
    domain::{ParticipantId, SessionId},
    error::{ApiError, ErrorCode},
    protocol::{
        AdvanceOutcome, AdvanceRequest, PageView, SelectRequest, Selection, SessionSnapshot,
        SessionStart,
    },
};
use storage::{Catalog, ChoiceSink, CsvChoiceLog, RemoteChoiceLog, Storage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

mod app_state;
mod config;
mod thumbnails;

use app_state::AppState;
use config::{load_settings, LogSinkKind, Settings};
use thumbnails::ThumbnailResolver;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let catalog = Catalog::load(&settings.metadata_path, settings.max_pages).map_err(|error| {
        error!(
            metadata_path = %settings.metadata_path.display(),
            %error,
            "failed to load video metadata"
        );
        error
    })?;
    if catalog.is_empty() {
        anyhow::bail!(
            "no pages found in {}; nothing to survey",
            settings.metadata_path.display()
        );
    }
    info!(
        pages = catalog.pages().len(),
        items = catalog.item_count(),
        warnings = catalog.warnings().len(),
        "catalog loaded"
    );

    let time_zone = parse_time_zone(&settings.time_zone)
        .with_context(|| format!("unknown time zone '{}'", settings.time_zone))?;
    let (sink, storage) = open_sink(&settings).await?;
    info!(sink = sink.name(), %time_zone, "choice log ready");

    let state = AppState {
        survey: SurveyContext::new(catalog, sink, time_zone, settings.rng_seed)
            .with_session_ttl(Duration::from_secs(settings.session_ttl_secs)),
        thumbnails: ThumbnailResolver::new(settings.thumbnail_dir.clone()),
        storage,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_sink(settings: &Settings) -> anyhow::Result<(Arc<dyn ChoiceSink>, Option<Storage>)> {
    match settings.log_sink.parse::<LogSinkKind>()? {
        LogSinkKind::Csv => Ok((Arc::new(CsvChoiceLog::new(&settings.csv_log_path)), None)),
        LogSinkKind::Remote => {
            let raw = settings
                .remote_log_url
                .as_deref()
                .context("remote log sink requires remote_log_url")?;
            let endpoint = Url::parse(raw).with_context(|| format!("invalid remote_log_url '{raw}'"))?;
            let timeout = Duration::from_millis(settings.remote_log_timeout_ms);
            let log = RemoteChoiceLog::new(endpoint, timeout)?;
            info!(endpoint = %log.endpoint(), ?timeout, "posting choices to remote log");
            Ok((Arc::new(log), None))
        }
        LogSinkKind::Sqlite => {
            let storage = Storage::new(&settings.database_url).await.map_err(|error| {
                error!(
                    database_url = %settings.database_url,
                    %error,
                    "failed to open SQLite database; verify parent directory exists and permissions are correct"
                );
                error
            })?;
            Ok((Arc::new(storage.clone()), Some(storage)))
        }
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", post(http_start_session))
        .route("/sessions/:session_id", get(http_snapshot))
        .route("/sessions/:session_id/page", get(http_enter_page))
        .route("/sessions/:session_id/select", post(http_select_item))
        .route("/sessions/:session_id/advance", post(http_advance))
        .route("/thumbnails/:file", get(thumbnail_file))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

fn api_error(error: ApiError) -> HttpError {
    let status = match error.code {
        ErrorCode::NoSelection => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NoPages => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

fn parse_session_id(raw: &str) -> Result<SessionId, HttpError> {
    raw.parse()
        .map(SessionId)
        .map_err(|_| api_error(ApiError::new(ErrorCode::Validation, "malformed session id")))
}

/// First `pid` value in the query string, if any.
fn participant_from_query(query: Option<&str>) -> ParticipantId {
    let pid = query.and_then(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .find(|(key, _)| key == "pid")
            .map(|(_, value)| value.into_owned())
    });
    ParticipantId::from_query(pid.as_deref())
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    if let Some(storage) = &state.storage {
        storage.health_check().await.map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    }
    Ok("ok")
}

async fn http_start_session(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<SessionStart>, HttpError> {
    let participant = participant_from_query(query.as_deref());
    session::initialize_session(&state.survey, participant)
        .map(Json)
        .map_err(api_error)
}

async fn http_enter_page(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<PageView>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let mut view = session::enter_page(&state.survey, session_id).map_err(api_error)?;
    state.thumbnails.decorate(&mut view).await;
    Ok(Json(view))
}

async fn http_select_item(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<Selection>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    session::select_item(&state.survey, session_id, req.page, &req.item_id)
        .map(Json)
        .map_err(api_error)
}

async fn http_advance(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<AdvanceOutcome>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    session::advance(&state.survey, session_id, req.page)
        .await
        .map(Json)
        .map_err(|error| {
            if error.code == ErrorCode::NoSelection {
                warn!(%session_id, page = %req.page, "advance without a selection");
            }
            api_error(error)
        })
}

async fn http_snapshot(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    session::snapshot(&state.survey, session_id)
        .map(Json)
        .map_err(api_error)
}

async fn thumbnail_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let not_found = || api_error(ApiError::new(ErrorCode::NotFound, "thumbnail not found"));
    let path = state.thumbnails.asset_path(&file).ok_or_else(not_found)?;
    let bytes = tokio::fs::read(&path).await.map_err(|_| not_found())?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&path)),
    );
    Ok((StatusCode::OK, headers, bytes))
}

fn content_type_for(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
