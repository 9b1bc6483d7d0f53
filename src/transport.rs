use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const REDACTED_FIELDS: [&str; 2] = ["refresh_token", "client_secret"];

/// Performs one POST against a token endpoint. Injected so callers and tests
/// can replace the network.
pub type TokenTransport =
    Arc<dyn Fn(&TokenRequest) -> Result<TokenReply, TransportError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub endpoint: String,
    pub form: Vec<(String, String)>,
}

impl TokenRequest {
    pub fn refresh(
        endpoint: &str,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Self {
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), client_id.to_string()),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret".to_string(), secret.to_string()));
        }
        Self {
            endpoint: endpoint.to_string(),
            form,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn redacted_raw(&self) -> String {
        let body = self
            .form
            .iter()
            .map(|(key, value)| {
                if REDACTED_FIELDS.contains(&key.as_str()) {
                    format!("{}=<sha256:{}>", key, short_hash_hex(value.as_bytes()))
                } else {
                    format!("{}={}", key, value)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "POST {}\nContent-Type: {}\nAccept: application/json\n\n{}",
            self.endpoint, FORM_CONTENT_TYPE, body
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReply {
    pub status: u16,
    pub body: String,
}

impl TokenReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn raw(&self) -> String {
        format!("HTTP {}\n\n{}", self.status, self.body)
    }
}

/// The request/response pair kept for diagnosing a rejected refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExchange {
    pub request_raw: String,
    pub response_raw: String,
}

/// The call did not produce an HTTP response (DNS, connect, timeout, body read).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub fn http_token_transport(timeout: Duration) -> TokenTransport {
    Arc::new(move |request: &TokenRequest| post_token_form(request, timeout))
}

fn post_token_form(request: &TokenRequest, timeout: Duration) -> Result<TokenReply, TransportError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| TransportError::new(format!("failed to build HTTP client: {}", err)))?;

    let response = client
        .post(&request.endpoint)
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .header(ACCEPT, "application/json")
        .form(&request.form)
        .send()
        .map_err(|err| TransportError::new(format!("token request failed: {}", err)))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| TransportError::new(format!("failed to read token response: {}", err)))?;

    Ok(TokenReply { status, body })
}

pub(crate) fn short_hash_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..16].to_string()
}

pub(crate) fn token_fingerprint(token: &str) -> String {
    short_hash_hex(token.trim().as_bytes())
}
