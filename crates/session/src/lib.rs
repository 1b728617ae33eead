use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use shared::{
    domain::{ChatMessage, DuplicateUploads, SessionId, UploadedFileRecord},
    protocol::{Notice, RejectedUpload, SessionSummary, UploadRejection, UploadReport},
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

mod registry;
mod uploads;

pub use registry::{AgentRegistry, RegistryError};
pub use uploads::{UploadPolicy, DEFAULT_ALLOWED_EXTENSIONS};

pub type SharedSession = Arc<Mutex<SessionState>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),
}

/// Everything one user sees during a session. Nothing here outlives the
/// process.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    messages: Vec<ChatMessage>,
    files: Vec<UploadedFileRecord>,
    agents: AgentRegistry,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_message(&mut self, message: ChatMessage) -> &ChatMessage {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn files(&self) -> &[UploadedFileRecord] {
        &self.files
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentRegistry {
        &mut self.agents
    }

    pub fn record_upload(
        &mut self,
        name: &str,
        policy: &UploadPolicy,
    ) -> Result<&UploadedFileRecord, UploadRejection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UploadRejection::MissingName);
        }
        if !policy.allows(name) {
            return Err(UploadRejection::ExtensionNotAllowed);
        }
        if policy.duplicates == DuplicateUploads::Skip
            && self.files.iter().any(|file| file.name == name)
        {
            return Err(UploadRejection::AlreadyRecorded);
        }

        self.files.push(UploadedFileRecord {
            name: name.to_string(),
            uploaded_at: Utc::now(),
        });
        Ok(&self.files[self.files.len() - 1])
    }

    /// Records a batch in submission order: a success notice per accepted
    /// file, a warning per rejected one.
    pub fn record_uploads<I, S>(&mut self, names: I, policy: &UploadPolicy) -> UploadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = UploadReport::default();
        for name in names {
            let name = name.as_ref();
            match self.record_upload(name, policy) {
                Ok(record) => {
                    report.notices.push(Notice::success(format!("✅ {}", record.name)));
                    report.accepted.push(record.clone());
                }
                Err(reason) => {
                    debug!(file = name, ?reason, "upload not recorded");
                    report
                        .notices
                        .push(Notice::warning(format!("⚠️ {name}: {}", reason.describe())));
                    report.rejected.push(RejectedUpload {
                        name: name.to_string(),
                        reason,
                    });
                }
            }
        }
        report
    }

    /// Empties chat and files. Registered agents survive.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.files.clear();
    }

    pub fn reset(&mut self) {
        self.clear();
        self.agents.clear();
    }

    pub fn summary(&self, session_id: SessionId) -> SessionSummary {
        SessionSummary {
            session_id,
            files: self.files.len(),
            agents: self.agents.len(),
            messages: self.messages.len(),
        }
    }
}

struct SessionEntry {
    state: SharedSession,
    last_seen: Instant,
}

/// Open sessions by id. With an idle TTL, sessions untouched for longer
/// than the TTL are dropped the next time the store is opened into or read.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    idle_ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl: Some(idle_ttl),
            ..Self::default()
        }
    }

    pub async fn open(&self) -> SessionId {
        let session_id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions);
        sessions.insert(
            session_id,
            SessionEntry {
                state: Arc::new(Mutex::new(SessionState::new())),
                last_seen: Instant::now(),
            },
        );
        session_id
    }

    /// Looks a session up and marks it as seen.
    pub async fn get(&self, session_id: SessionId) -> Result<SharedSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions);
        let entry = sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        entry.last_seen = Instant::now();
        Ok(entry.state.clone())
    }

    pub async fn close(&self, session_id: SessionId) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or(SessionError::NotFound(session_id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn evict_idle(&self, sessions: &mut HashMap<SessionId, SessionEntry>) {
        let Some(idle_ttl) = self.idle_ttl else {
            return;
        };
        sessions.retain(|session_id, entry| {
            let alive = entry.last_seen.elapsed() < idle_ttl;
            if !alive {
                info!(%session_id, "idle session evicted");
            }
            alive
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
