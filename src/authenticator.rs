//! Public facade: resolves a bearer token and an API base per request.
//!
//! Nothing is cached in memory; every call starts from the credential file.
//! Two callers that both see an expired token will both refresh unless the
//! provider's refresh lock is enabled.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{AuthError, AuthResult};
use crate::expiry::{self, ExpiryPolicy};
use crate::lock::RefreshLock;
use crate::provider::{default_home_dir, ApiBaseSource, Provider, ProviderAdapter, ProviderConfig};
use crate::record::CredentialRecord;
use crate::store::{CredentialStore, PersistObserver};
use crate::transport::TokenTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub api_base: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub provider: String,
    pub credential_path: String,
    pub credentials_found: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<String>,
    pub key_remaining: String,
    pub expired: bool,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    adapter: ProviderAdapter,
    store: CredentialStore,
    policy: ExpiryPolicy,
    lock: Option<RefreshLock>,
}

impl Authenticator {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_adapter(ProviderAdapter::new(config))
    }

    pub fn from_env(provider: Provider) -> Self {
        Self::new(provider.config_from_env(&default_home_dir()))
    }

    pub fn with_transport(config: ProviderConfig, transport: TokenTransport) -> Self {
        Self::with_adapter(ProviderAdapter::with_transport(config, transport))
    }

    fn with_adapter(adapter: ProviderAdapter) -> Self {
        let config = adapter.config();
        let store = CredentialStore::new(&config.credential_path);
        let lock = config
            .refresh_lock
            .then(|| RefreshLock::for_credentials(&config.credential_path));
        Self {
            adapter,
            store,
            policy: ExpiryPolicy::default(),
            lock,
        }
    }

    pub fn with_persist_observer(mut self, observer: PersistObserver) -> Self {
        self.store = self.store.with_observer(observer);
        self
    }

    pub fn with_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        self.adapter.config()
    }

    pub fn credential_path(&self) -> &Path {
        self.store.path()
    }

    /// Returns a token that is valid for at least the policy margin,
    /// refreshing it first if needed.
    pub fn get_access_token(&self) -> AuthResult<String> {
        let record = self.load_required()?;
        if let Some(token) = self.valid_access_token(&record) {
            return Ok(token);
        }

        let refresh_token = self.required_refresh_token(&record)?;
        match &self.lock {
            None => self.adapter.refresh(&refresh_token, &self.store),
            Some(lock) => lock.with_exclusive(|| self.refresh_under_lock(&refresh_token)),
        }
    }

    /// API base for outbound requests. Reads the record only when the
    /// provider takes its base from it; never touches the network.
    pub fn get_api_base(&self) -> String {
        match self.config().api_base_source {
            ApiBaseSource::Static => self.adapter.resolve_api_base(None),
            ApiBaseSource::RecordField(_) => {
                let record = self.store.load();
                self.adapter.resolve_api_base(record.as_ref())
            }
        }
    }

    /// Caller-supplied values win; blanks count as absent.
    pub fn resolve_endpoint(
        &self,
        api_base: Option<&str>,
        api_key: Option<&str>,
    ) -> AuthResult<ResolvedEndpoint> {
        let api_base = match non_blank(api_base) {
            Some(base) => base.to_string(),
            None => self.get_api_base(),
        };
        let api_key = match non_blank(api_key) {
            Some(key) => key.to_string(),
            None => self.get_access_token()?,
        };
        Ok(ResolvedEndpoint { api_base, api_key })
    }

    pub fn status(&self) -> CredentialStatus {
        let record = self.store.load();
        let expiry_date = record.as_ref().and_then(CredentialRecord::expiry_date);
        let expires_at = expiry_date.and_then(expiry::expiry_datetime);

        CredentialStatus {
            provider: self.config().name.clone(),
            credential_path: self.store.path().display().to_string(),
            credentials_found: record.is_some(),
            has_access_token: record
                .as_ref()
                .and_then(CredentialRecord::access_token)
                .is_some(),
            has_refresh_token: record
                .as_ref()
                .and_then(CredentialRecord::refresh_token)
                .is_some(),
            expires_at: expires_at.map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            key_remaining: format_key_remaining(expires_at.as_ref()),
            expired: self.policy.is_expired(expiry_date),
            api_base: self.adapter.resolve_api_base(record.as_ref()),
        }
    }

    fn load_required(&self) -> AuthResult<CredentialRecord> {
        self.store.load().ok_or_else(|| {
            let config = self.config();
            AuthError::missing(format!(
                "{} OAuth credentials not found at {}. {}",
                config.display_name,
                self.store.path().display(),
                config.login_hint
            ))
        })
    }

    fn valid_access_token(&self, record: &CredentialRecord) -> Option<String> {
        let token = record.access_token()?;
        if self.policy.is_expired(record.expiry_date()) {
            return None;
        }
        Some(token.to_string())
    }

    fn required_refresh_token(&self, record: &CredentialRecord) -> AuthResult<String> {
        record.refresh_token().map(str::to_string).ok_or_else(|| {
            let config = self.config();
            AuthError::missing(format!(
                "{} access token expired and no refresh token available. {}",
                config.display_name, config.login_hint
            ))
        })
    }

    /// Re-checks under the lock: a holder before us may already have saved a
    /// fresh token, or rotated the refresh token.
    fn refresh_under_lock(&self, refresh_token: &str) -> AuthResult<String> {
        let current = self.store.load();
        if let Some(record) = &current {
            if let Some(token) = self.valid_access_token(record) {
                tracing::debug!(provider = %self.config().name, "reusing token refreshed by another holder");
                return Ok(token);
            }
        }
        let refresh_token = current
            .as_ref()
            .and_then(CredentialRecord::refresh_token)
            .unwrap_or(refresh_token)
            .to_string();
        self.adapter.refresh(&refresh_token, &self.store)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn format_key_remaining(expires_at: Option<&DateTime<Utc>>) -> String {
    let Some(expires_at) = expires_at else {
        return "--".to_string();
    };
    let remaining = (*expires_at - Utc::now()).num_seconds();
    if remaining <= 0 {
        return "expired".to_string();
    }
    format_duration(remaining)
}

fn format_duration(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}
