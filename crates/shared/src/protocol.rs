use serde::{Deserialize, Serialize};

use crate::domain::{AgentCapability, AgentRecord, ChatMessage, SessionId, UploadedFileRecord};

pub const TTS_PLACEHOLDER: &str = "TTS feature - ready for implementation";
pub const CLEARED_ACK: &str = "Cleared!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
}

/// A short user-facing acknowledgement attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub files: usize,
    pub agents: usize,
    pub messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub summary: SessionSummary,
    pub notice: Notice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub user: ChatMessage,
    pub assistant: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    /// Missing fields decode as empty so the registry reports them.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub capability: AgentCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentResponse {
    pub index: usize,
    pub agent: AgentRecord,
    pub notice: Notice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListing {
    pub index: usize,
    #[serde(flatten)]
    pub agent: AgentRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRejection {
    ExtensionNotAllowed,
    AlreadyRecorded,
    MissingName,
}

impl UploadRejection {
    pub fn describe(self) -> &'static str {
        match self {
            Self::ExtensionNotAllowed => "file type not allowed",
            Self::AlreadyRecorded => "already uploaded",
            Self::MissingName => "no file name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedUpload {
    pub name: String,
    pub reason: UploadRejection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReport {
    pub accepted: Vec<UploadedFileRecord>,
    pub rejected: Vec<RejectedUpload>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsResponse {
    pub characters: usize,
    pub notice: Notice,
}
