use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::error::{AuthError, AuthResult, STATUS_INTERNAL, STATUS_UNAUTHORIZED};
use crate::record::{self, CredentialRecord};
use crate::store::CredentialStore;
use crate::transport::{
    http_token_transport, token_fingerprint, RawExchange, TokenRequest, TokenTransport,
    REFRESH_TIMEOUT,
};

pub const CREDENTIAL_FILE_NAME: &str = "oauth_creds.json";

const QWEN_TOKEN_ENDPOINT: &str = "https://chat.qwen.ai/api/v1/oauth2/token";
const QWEN_OAUTH_CLIENT_ID: &str = "f0304373b74a44d2b584a3fb70ca9e56";
const QWEN_DEFAULT_API_BASE: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const QWEN_API_BASE_FIELD: &str = "resource_url";

const GEMINI_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const GEMINI_OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const GEMINI_DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiBaseSource {
    Static,
    RecordField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub display_name: String,
    /// Appended to missing-credential errors.
    pub login_hint: String,
    pub token_endpoint: String,
    pub client_id: String,
    /// `None` for public device-flow clients.
    pub client_secret: Option<String>,
    pub default_api_base: String,
    pub api_base_source: ApiBaseSource,
    pub credential_path: PathBuf,
    pub refresh_timeout: Duration,
    pub refresh_lock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Qwen,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Qwen, Provider::Gemini];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "qwen" | "qwen-oauth" | "qwen_oauth" => Some(Self::Qwen),
            "gemini" | "gemini-oauth" | "gemini_oauth" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Qwen => "qwen",
            Self::Gemini => "gemini",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Self::Qwen => "QWEN_OAUTH",
            Self::Gemini => "GEMINI_OAUTH",
        }
    }

    pub fn defaults(&self, home_dir: &Path) -> ProviderConfig {
        match self {
            Self::Qwen => ProviderConfig {
                name: self.name().to_string(),
                display_name: "Qwen".to_string(),
                login_hint: "Please authenticate via Qwen CLI.".to_string(),
                token_endpoint: QWEN_TOKEN_ENDPOINT.to_string(),
                client_id: QWEN_OAUTH_CLIENT_ID.to_string(),
                client_secret: None,
                default_api_base: QWEN_DEFAULT_API_BASE.to_string(),
                api_base_source: ApiBaseSource::RecordField(QWEN_API_BASE_FIELD.to_string()),
                credential_path: home_dir.join(".qwen").join(CREDENTIAL_FILE_NAME),
                refresh_timeout: REFRESH_TIMEOUT,
                refresh_lock: false,
            },
            Self::Gemini => ProviderConfig {
                name: self.name().to_string(),
                display_name: "Gemini".to_string(),
                login_hint: "Please log in via Gemini CLI.".to_string(),
                token_endpoint: GEMINI_TOKEN_ENDPOINT.to_string(),
                client_id: GEMINI_OAUTH_CLIENT_ID.to_string(),
                client_secret: None,
                default_api_base: GEMINI_DEFAULT_API_BASE.to_string(),
                api_base_source: ApiBaseSource::Static,
                credential_path: home_dir.join(".gemini").join(CREDENTIAL_FILE_NAME),
                refresh_timeout: REFRESH_TIMEOUT,
                refresh_lock: false,
            },
        }
    }

    pub fn config_from_env(&self, home_dir: &Path) -> ProviderConfig {
        self.config_from_lookup(home_dir, |key| std::env::var(key).ok())
    }

    /// Built-in profile with overrides from `lookup`. Blank values are ignored;
    /// `TOKEN_DIR` wins over `TOKEN_FILE`.
    pub fn config_from_lookup<F>(&self, home_dir: &Path, lookup: F) -> ProviderConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = self.env_prefix();
        let var = |suffix: &str| {
            lookup(&format!("{}_{}", prefix, suffix)).filter(|value| !value.trim().is_empty())
        };

        let mut config = self.defaults(home_dir);
        if let Some(token_file) = var("TOKEN_FILE") {
            config.credential_path = expand_home(token_file.trim(), home_dir);
        }
        if let Some(token_dir) = var("TOKEN_DIR") {
            config.credential_path = expand_home(token_dir.trim(), home_dir).join(CREDENTIAL_FILE_NAME);
        }
        if let Some(api_base) = var("API_BASE") {
            config.default_api_base = api_base.trim().to_string();
        }
        if let Some(client_id) = var("CLIENT_ID") {
            config.client_id = client_id.trim().to_string();
        }
        if let Some(client_secret) = var("CLIENT_SECRET") {
            config.client_secret = Some(client_secret.trim().to_string());
        }
        if let Some(flag) = var("REFRESH_LOCK") {
            config.refresh_lock = parse_flag(&flag);
        }
        config
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(raw: &str, home_dir: &Path) -> PathBuf {
    if raw == "~" {
        return home_dir.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home_dir.join(rest),
        None => PathBuf::from(raw),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Clone)]
pub struct ProviderAdapter {
    config: ProviderConfig,
    transport: TokenTransport,
}

impl fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProviderAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        let transport = http_token_transport(config.refresh_timeout);
        Self { config, transport }
    }

    pub fn with_transport(config: ProviderConfig, transport: TokenTransport) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn resolve_api_base(&self, record: Option<&CredentialRecord>) -> String {
        match &self.config.api_base_source {
            ApiBaseSource::Static => self.config.default_api_base.clone(),
            ApiBaseSource::RecordField(field) => record
                .and_then(|record| record.string_field(field))
                .map(str::to_string)
                .unwrap_or_else(|| self.config.default_api_base.clone()),
        }
    }

    /// Exchanges `refresh_token` for a new access token and writes the merged
    /// record back through `store`. The store is only touched on success.
    pub fn refresh(&self, refresh_token: &str, store: &CredentialStore) -> AuthResult<String> {
        let provider = self.config.display_name.as_str();
        let request = TokenRequest::refresh(
            &self.config.token_endpoint,
            refresh_token,
            &self.config.client_id,
            self.config.client_secret.as_deref(),
        );
        tracing::debug!(
            provider = %self.config.name,
            endpoint = %self.config.token_endpoint,
            refresh_fp = %token_fingerprint(refresh_token),
            "refreshing OAuth access token"
        );

        let reply = (self.transport)(&request).map_err(|err| {
            AuthError::refresh_failed(
                STATUS_INTERNAL,
                format!("{} OAuth refresh failed: {}", provider, err),
            )
        })?;

        if !reply.is_success() {
            tracing::warn!(
                provider = %self.config.name,
                status = reply.status,
                "OAuth refresh rejected by token endpoint"
            );
            return Err(AuthError::RefreshFailed {
                status: reply.status,
                message: format!(
                    "{} OAuth refresh failed ({}): {}",
                    provider,
                    reply.status,
                    truncate_chars(reply.body.trim(), 200)
                ),
                exchange: Some(RawExchange {
                    request_raw: request.redacted_raw(),
                    response_raw: reply.raw(),
                }),
            });
        }

        let payload = match serde_json::from_str::<Value>(&reply.body) {
            Ok(Value::Object(payload)) => payload,
            Ok(_) => {
                return Err(AuthError::refresh_failed(
                    STATUS_INTERNAL,
                    format!("{} OAuth refresh failed: response is not a JSON object", provider),
                ))
            }
            Err(err) => {
                return Err(AuthError::refresh_failed(
                    STATUS_INTERNAL,
                    format!("{} OAuth refresh failed: {}", provider, err),
                ))
            }
        };

        let access_token = record::value_as_str(payload.get(record::ACCESS_TOKEN))
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::refresh_failed(
                    STATUS_UNAUTHORIZED,
                    format!("{} OAuth refresh response missing access_token", provider),
                )
            })?;

        // Another process may have refreshed meanwhile; merge over what is on disk now.
        let mut merged = store.load().unwrap_or_default();
        merged.merge_refresh_response(&payload, refresh_token, Utc::now());
        let persisted = store.save(&merged);

        tracing::info!(
            provider = %self.config.name,
            access_fp = %token_fingerprint(&access_token),
            rotated_refresh = payload.contains_key(record::REFRESH_TOKEN),
            persisted,
            "OAuth access token refreshed"
        );
        Ok(access_token)
    }
}

fn truncate_chars(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect::<String>()
}
