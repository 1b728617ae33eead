use std::sync::Arc;

use completion::{CompletionClient, CompletionError, CompletionRequest, GenerationPolicy};
use session::{RegistryError, SessionError, SessionStore, SharedSession, UploadPolicy};
use shared::{
    domain::{AgentCapability, AgentRecord, ChatMessage, SessionId, UploadedFileRecord},
    error::ApiError,
    protocol::{
        AgentListing, ChatTurnResponse, ClearResponse, Notice, RegisterAgentResponse,
        SessionSummary, TtsResponse, UploadReport, CLEARED_ACK, TTS_PLACEHOLDER,
    },
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub sessions: SessionStore,
    pub completion: Arc<dyn CompletionClient>,
    pub generation: GenerationPolicy,
    pub uploads: UploadPolicy,
}

pub async fn open_session(ctx: &ApiContext) -> SessionSummary {
    let session_id = ctx.sessions.open().await;
    info!(%session_id, "session opened");
    SessionSummary {
        session_id,
        files: 0,
        agents: 0,
        messages: 0,
    }
}

pub async fn session_summary(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<SessionSummary, ApiError> {
    let session = session(ctx, session_id).await?;
    let state = session.lock().await;
    Ok(state.summary(session_id))
}

pub async fn close_session(ctx: &ApiContext, session_id: SessionId) -> Result<(), ApiError> {
    ctx.sessions.close(session_id).await.map_err(not_found)?;
    info!(%session_id, "session closed");
    Ok(())
}

pub async fn clear_session(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<ClearResponse, ApiError> {
    let session = session(ctx, session_id).await?;
    let mut state = session.lock().await;
    state.clear();
    info!(%session_id, "chat history and files cleared");
    Ok(ClearResponse {
        summary: state.summary(session_id),
        notice: Notice::success(CLEARED_ACK),
    })
}

pub async fn reset_session(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<SessionSummary, ApiError> {
    let session = session(ctx, session_id).await?;
    let mut state = session.lock().await;
    state.reset();
    info!(%session_id, "session reset");
    Ok(state.summary(session_id))
}

pub async fn chat_history(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<Vec<ChatMessage>, ApiError> {
    let session = session(ctx, session_id).await?;
    let state = session.lock().await;
    Ok(state.messages().to_vec())
}

/// Runs one chat turn. `Ok(None)` means the prompt was blank and nothing
/// happened. Only the current prompt is sent; earlier turns are not replayed.
///
/// The session stays locked across the completion call so a second action on
/// the same session waits for this turn to finish.
pub async fn submit_chat(
    ctx: &ApiContext,
    session_id: SessionId,
    prompt: &str,
) -> Result<Option<ChatTurnResponse>, ApiError> {
    let session = session(ctx, session_id).await?;
    if prompt.trim().is_empty() {
        return Ok(None);
    }

    let mut state = session.lock().await;
    let user = state.push_message(ChatMessage::user(prompt)).clone();

    let completion = ctx
        .completion
        .complete(CompletionRequest {
            prompt: prompt.to_string(),
            policy: ctx.generation,
        })
        .await
        .map_err(|err| {
            warn!(%session_id, model = ctx.completion.model(), error = %err, "completion failed");
            upstream(err)
        })?;

    let assistant = state
        .push_message(ChatMessage::assistant(completion.text))
        .clone();
    info!(%session_id, transcript = state.messages().len(), "chat turn completed");
    Ok(Some(ChatTurnResponse { user, assistant }))
}

pub async fn list_files(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<Vec<UploadedFileRecord>, ApiError> {
    let session = session(ctx, session_id).await?;
    let state = session.lock().await;
    Ok(state.files().to_vec())
}

pub async fn record_uploads(
    ctx: &ApiContext,
    session_id: SessionId,
    names: &[String],
) -> Result<UploadReport, ApiError> {
    let session = session(ctx, session_id).await?;
    let mut state = session.lock().await;
    let report = state.record_uploads(names, &ctx.uploads);
    info!(
        %session_id,
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "uploads recorded"
    );
    Ok(report)
}

pub async fn register_agent(
    ctx: &ApiContext,
    session_id: SessionId,
    name: &str,
    url: &str,
    capability: AgentCapability,
) -> Result<RegisterAgentResponse, ApiError> {
    let session = session(ctx, session_id).await?;
    let mut state = session.lock().await;
    let (index, agent) = state
        .agents_mut()
        .register(name, url, capability)
        .map_err(|err| {
            warn!(%session_id, error = %err, "agent registration rejected");
            registry_error(err)
        })?;
    info!(%session_id, index, agent = %agent.name, "agent registered");
    Ok(RegisterAgentResponse {
        index,
        notice: Notice::success(format!("✅ {} registered", agent.name)),
        agent: agent.clone(),
    })
}

pub async fn list_agents(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<Vec<AgentListing>, ApiError> {
    let session = session(ctx, session_id).await?;
    let state = session.lock().await;
    Ok(state
        .agents()
        .list()
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, agent)| AgentListing { index, agent })
        .collect())
}

pub async fn delete_agent(
    ctx: &ApiContext,
    session_id: SessionId,
    index: usize,
) -> Result<AgentRecord, ApiError> {
    let session = session(ctx, session_id).await?;
    let mut state = session.lock().await;
    let removed = state.agents_mut().delete(index).map_err(registry_error)?;
    info!(%session_id, index, agent = %removed.name, "agent removed");
    Ok(removed)
}

/// Speech synthesis is not wired up; this only acknowledges the request.
pub async fn speak(
    ctx: &ApiContext,
    session_id: SessionId,
    text: &str,
) -> Result<TtsResponse, ApiError> {
    session(ctx, session_id).await?;
    Ok(TtsResponse {
        characters: text.chars().count(),
        notice: Notice::info(TTS_PLACEHOLDER),
    })
}

async fn session(ctx: &ApiContext, session_id: SessionId) -> Result<SharedSession, ApiError> {
    ctx.sessions.get(session_id).await.map_err(not_found)
}

fn not_found(err: SessionError) -> ApiError {
    ApiError::not_found(err.to_string())
}

fn registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::MissingField => {
            ApiError::validation("Please provide both an agent name and an agent url")
        }
        RegistryError::IndexOutOfRange { .. } => ApiError::not_found(err.to_string()),
    }
}

fn upstream(err: CompletionError) -> ApiError {
    ApiError::upstream(format!("Error: {err}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
