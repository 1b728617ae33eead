use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AgentCapability, AgentRecord, ChatMessage, SessionId, UploadedFileRecord},
    error::{ApiError, ApiException},
    protocol::{
        AgentListing, ChatRequest, ChatTurnResponse, ClearResponse, RegisterAgentRequest,
        RegisterAgentResponse, SessionSummary, TtsRequest, TtsResponse, UploadReport,
    },
};
use tracing::debug;

pub struct SessionClient {
    http: Client,
    server_url: String,
}

impl SessionClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    pub async fn open(&self) -> Result<SessionSummary> {
        let res = self.http.post(self.url("/sessions")).send().await?;
        decode(res).await
    }

    pub async fn summary(&self, session_id: SessionId) -> Result<SessionSummary> {
        let res = self
            .http
            .get(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn close(&self, session_id: SessionId) -> Result<()> {
        let res = self
            .http
            .delete(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await?;
        check(res).await.map(|_| ())
    }

    pub async fn clear(&self, session_id: SessionId) -> Result<ClearResponse> {
        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/clear")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn reset(&self, session_id: SessionId) -> Result<SessionSummary> {
        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/reset")))
            .send()
            .await?;
        decode(res).await
    }

    /// `Ok(None)` when the server ignored a blank prompt.
    pub async fn chat(&self, session_id: SessionId, prompt: &str) -> Result<Option<ChatTurnResponse>> {
        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/chat")))
            .json(&ChatRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        decode(res).await.map(Some)
    }

    pub async fn history(&self, session_id: SessionId) -> Result<Vec<ChatMessage>> {
        let res = self
            .http
            .get(self.url(&format!("/sessions/{session_id}/chat")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn upload(&self, session_id: SessionId, paths: &[PathBuf]) -> Result<UploadReport> {
        let mut form = multipart::Form::new();
        for path in paths {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("'{}' has no usable file name", path.display()))?
                .to_string();
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            form = form.part("files", multipart::Part::bytes(bytes).file_name(file_name));
        }

        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/files")))
            .multipart(form)
            .send()
            .await?;
        decode(res).await
    }

    pub async fn files(&self, session_id: SessionId) -> Result<Vec<UploadedFileRecord>> {
        let res = self
            .http
            .get(self.url(&format!("/sessions/{session_id}/files")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn register(
        &self,
        session_id: SessionId,
        name: &str,
        url: &str,
        capability: AgentCapability,
    ) -> Result<RegisterAgentResponse> {
        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/agents")))
            .json(&RegisterAgentRequest {
                name: name.to_string(),
                url: url.to_string(),
                capability,
            })
            .send()
            .await?;
        decode(res).await
    }

    pub async fn agents(&self, session_id: SessionId) -> Result<Vec<AgentListing>> {
        let res = self
            .http
            .get(self.url(&format!("/sessions/{session_id}/agents")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn delete_agent(&self, session_id: SessionId, index: usize) -> Result<AgentRecord> {
        let res = self
            .http
            .delete(self.url(&format!("/sessions/{session_id}/agents/{index}")))
            .send()
            .await?;
        decode(res).await
    }

    pub async fn speak(&self, session_id: SessionId, text: &str) -> Result<TtsResponse> {
        let res = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/tts")))
            .json(&TtsRequest {
                text: text.to_string(),
            })
            .send()
            .await?;
        decode(res).await
    }
}

async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    debug!(%status, "request rejected by server");
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(ApiException::from(api_error).into()),
        Err(_) => Err(anyhow!("server returned {status}: {body}")),
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    let res = check(res).await?;
    Ok(res.json().await?)
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
