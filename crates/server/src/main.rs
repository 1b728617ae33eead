use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use completion::GeminiClient;
use server_api::ApiContext;
use shared::{
    domain::{AgentRecord, ChatMessage, SessionId, UploadedFileRecord},
    error::{ApiError, ErrorCode},
    protocol::{
        AgentListing, ChatRequest, ClearResponse, RegisterAgentRequest, RegisterAgentResponse,
        SessionSummary, TtsRequest, TtsResponse, UploadReport,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, API_KEY_REMEDIATION};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    if let Err(err) = settings.validate() {
        error!(%err, "invalid settings");
        return Ok(ExitCode::FAILURE);
    }
    let gemini = match settings.gemini() {
        Ok(gemini) => gemini,
        Err(err) => {
            error!(%err, "cannot start without a Gemini API key");
            eprintln!("{err}\n{API_KEY_REMEDIATION}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let client = GeminiClient::new(gemini)?;
    info!(model = %settings.gemini_model, "completion client ready");

    let api = ApiContext {
        sessions: settings.session_store(),
        completion: Arc::new(client),
        generation: settings.generation(),
        uploads: settings.upload_policy(),
    };
    let app = build_router(Arc::new(AppState { api }), settings.max_upload_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(ExitCode::SUCCESS)
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", post(open_session))
        .route("/sessions/:session_id", get(session_summary).delete(close_session))
        .route("/sessions/:session_id/clear", post(clear_session))
        .route("/sessions/:session_id/reset", post(reset_session))
        .route("/sessions/:session_id/chat", get(chat_history).post(submit_chat))
        .route("/sessions/:session_id/files", get(list_files).post(upload_files))
        .route("/sessions/:session_id/agents", get(list_agents).post(register_agent))
        .route("/sessions/:session_id/agents/:index", delete(delete_agent))
        .route("/sessions/:session_id/tts", post(speak))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
    };
    (status, Json(err))
}

type SessionPath = Result<Path<SessionId>, PathRejection>;

/// Malformed ids and bodies get the same error shape as every other failure.
fn parse_session_id(path: SessionPath) -> ApiResult<SessionId> {
    path.map(|Path(session_id)| session_id).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "bad session path");
        reject(ApiError::validation(rejection.body_text()))
    })
}

fn multipart_body(body: Result<Multipart, MultipartRejection>) -> ApiResult<Multipart> {
    body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "bad upload request");
        reject(ApiError::validation(rejection.body_text()))
    })
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "bad request body");
        reject(ApiError::validation(rejection.body_text()))
    })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn open_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionSummary>) {
    let summary = server_api::open_session(&state.api).await;
    (StatusCode::CREATED, Json(summary))
}

async fn session_summary(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<SessionSummary>> {
    let session_id = parse_session_id(path)?;
    let summary = server_api::session_summary(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(summary))
}

async fn close_session(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<StatusCode> {
    let session_id = parse_session_id(path)?;
    server_api::close_session(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_session(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<ClearResponse>> {
    let session_id = parse_session_id(path)?;
    let cleared = server_api::clear_session(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(cleared))
}

async fn reset_session(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<SessionSummary>> {
    let session_id = parse_session_id(path)?;
    let summary = server_api::reset_session(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(summary))
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let session_id = parse_session_id(path)?;
    let messages = server_api::chat_history(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(messages))
}

async fn submit_chat(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let session_id = parse_session_id(path)?;
    let req = json_body(body)?;
    let turn = server_api::submit_chat(&state.api, session_id, &req.prompt)
        .await
        .map_err(reject)?;
    Ok(match turn {
        Some(turn) => Json(turn).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<Vec<UploadedFileRecord>>> {
    let session_id = parse_session_id(path)?;
    let files = server_api::list_files(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(files))
}

/// Only the file name of each part is kept; part bodies are never read.
async fn upload_files(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
    body: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadReport>> {
    let session_id = parse_session_id(path)?;
    let mut multipart = multipart_body(body)?;
    let mut names = Vec::new();
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            warn!(%session_id, error = %e, "malformed upload");
            reject(ApiError::validation(format!("malformed multipart body: {e}")))
        })?;
        let Some(field) = field else {
            break;
        };
        names.push(field.file_name().unwrap_or_default().to_string());
    }

    let report = server_api::record_uploads(&state.api, session_id, &names)
        .await
        .map_err(reject)?;
    Ok(Json(report))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
) -> ApiResult<Json<Vec<AgentListing>>> {
    let session_id = parse_session_id(path)?;
    let agents = server_api::list_agents(&state.api, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(agents))
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
    body: Result<Json<RegisterAgentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterAgentResponse>)> {
    let session_id = parse_session_id(path)?;
    let req = json_body(body)?;
    let registered =
        server_api::register_agent(&state.api, session_id, &req.name, &req.url, req.capability)
            .await
            .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(registered)))
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(SessionId, usize)>, PathRejection>,
) -> ApiResult<Json<AgentRecord>> {
    let (session_id, index) = path.map(|Path(params)| params).map_err(|rejection| {
        warn!(error = %rejection.body_text(), "bad agent path");
        reject(ApiError::validation(rejection.body_text()))
    })?;
    let removed = server_api::delete_agent(&state.api, session_id, index)
        .await
        .map_err(reject)?;
    Ok(Json(removed))
}

async fn speak(
    State(state): State<Arc<AppState>>,
    path: SessionPath,
    body: Result<Json<TtsRequest>, JsonRejection>,
) -> ApiResult<Json<TtsResponse>> {
    let session_id = parse_session_id(path)?;
    let req = json_body(body)?;
    let response = server_api::speak(&state.api, session_id, &req.text)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
