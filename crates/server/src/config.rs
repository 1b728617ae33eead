use std::{collections::HashMap, fmt, path::Path, time::Duration};

use anyhow::Context;
use completion::{GeminiConfig, GenerationPolicy, DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use session::{SessionStore, UploadPolicy, DEFAULT_ALLOWED_EXTENSIONS};
use shared::domain::DuplicateUploads;
use thiserror::Error;

pub const SERVER_FILE: &str = "server.toml";
pub const SECRETS_FILE: &str = "secrets.toml";

pub const API_KEY_REMEDIATION: &str = "Steps:
1. Export GEMINI_API_KEY=YOUR_KEY (or APP__GEMINI_API_KEY) before starting the server
2. Or add: gemini_api_key = \"YOUR_KEY\" to secrets.toml next to server.toml";

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f32,
        max: f32,
        value: f32,
    },
    #[error("max_output_tokens must be greater than zero")]
    ZeroOutputTokens,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_bind: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub request_timeout_seconds: u64,
    pub allowed_extensions: Vec<String>,
    pub duplicate_uploads: DuplicateUploads,
    pub max_upload_bytes: usize,
    /// Sessions idle longer than this are dropped; 0 keeps them until closed.
    pub session_idle_ttl_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let generation = GenerationPolicy::default();
        Self {
            server_bind: "127.0.0.1:8501".into(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.into(),
            temperature: generation.temperature,
            top_p: generation.top_p,
            max_output_tokens: generation.max_output_tokens,
            request_timeout_seconds: 60,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            duplicate_uploads: DuplicateUploads::Keep,
            max_upload_bytes: 32 * 1024 * 1024,
            session_idle_ttl_seconds: 60 * 60,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("server_bind", &self.server_bind)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_base", &self.gemini_api_base)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("duplicate_uploads", &self.duplicate_uploads)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_idle_ttl_seconds", &self.session_idle_ttl_seconds)
            .finish()
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        if self.max_output_tokens == 0 {
            return Err(SettingsError::ZeroOutputTokens);
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, SettingsError> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(SettingsError::MissingApiKey)
    }

    pub fn gemini(&self) -> Result<GeminiConfig, SettingsError> {
        Ok(GeminiConfig {
            api_key: self.require_api_key()?.to_string(),
            model: self.gemini_model.clone(),
            api_base: self.gemini_api_base.clone(),
            timeout: Duration::from_secs(self.request_timeout_seconds),
        })
    }

    pub fn generation(&self) -> GenerationPolicy {
        GenerationPolicy {
            temperature: self.temperature,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(&self.allowed_extensions, self.duplicate_uploads)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        (self.session_idle_ttl_seconds > 0)
            .then(|| Duration::from_secs(self.session_idle_ttl_seconds))
    }

    pub fn session_store(&self) -> SessionStore {
        match self.session_idle_ttl() {
            Some(ttl) => SessionStore::with_idle_ttl(ttl),
            None => SessionStore::new(),
        }
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), SettingsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_settings_with(Path::new(SERVER_FILE), Path::new(SECRETS_FILE), &env)
}

/// Layers, lowest precedence first: built-in defaults, `server_file`,
/// `secrets_file`, `APP__*` variables. `GEMINI_API_KEY` fills the key only
/// when no layer set it; `SERVER_BIND` and `GEMINI_MODEL` apply unless the
/// `APP__` form is present.
pub fn load_settings_with(
    server_file: &Path,
    secrets_file: &Path,
    env: &HashMap<String, String>,
) -> anyhow::Result<Settings> {
    let app_env: config::Map<String, String> = env
        .iter()
        .filter(|(key, _)| key.starts_with("APP__"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut settings: Settings = Config::builder()
        .add_source(
            File::from(server_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            File::from(secrets_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("allowed_extensions")
                .try_parsing(true)
                .source(Some(app_env)),
        )
        .build()
        .context("failed to read settings")?
        .try_deserialize()
        .context("failed to parse settings")?;

    if settings.gemini_api_key.is_none() {
        settings.gemini_api_key = env.get("GEMINI_API_KEY").cloned();
    }
    if !env.contains_key("APP__SERVER_BIND") {
        if let Some(v) = env.get("SERVER_BIND") {
            settings.server_bind = v.clone();
        }
    }
    if !env.contains_key("APP__GEMINI_MODEL") {
        if let Some(v) = env.get("GEMINI_MODEL") {
            settings.gemini_model = v.clone();
        }
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
