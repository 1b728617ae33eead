use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFileRecord {
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// What a registered agent claims to do. Known values serialize to fixed
/// snake_case strings; anything else round-trips verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentCapability {
    DocumentProcessing,
    Retrieval,
    Summarization,
    Translation,
    Speech,
    #[default]
    General,
    Custom(String),
}

impl AgentCapability {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DocumentProcessing => "document_processing",
            Self::Retrieval => "retrieval",
            Self::Summarization => "summarization",
            Self::Translation => "translation",
            Self::Speech => "speech",
            Self::General => "general",
            Self::Custom(value) => value,
        }
    }
}

impl From<String> for AgentCapability {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "document_processing" => Self::DocumentProcessing,
            "retrieval" => Self::Retrieval,
            "summarization" => Self::Summarization,
            "translation" => Self::Translation,
            "speech" => Self::Speech,
            "general" | "" => Self::General,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for AgentCapability {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AgentCapability> for String {
    fn from(value: AgentCapability) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub url: String,
    pub capability: AgentCapability,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateUploads {
    #[default]
    Keep,
    Skip,
}
