//! The credential record: a free-form JSON object with a few well-known keys.
//!
//! Unknown keys are kept verbatim and in order across load, merge and save,
//! since the file is owned by an external login tool.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const EXPIRY_DATE: &str = "expiry_date";
pub const EXPIRES_IN: &str = "expires_in";
pub const TOKEN_TYPE: &str = "token_type";
pub const SCOPE: &str = "scope";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("credential data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("credential data is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialRecord {
    fields: Map<String, Value>,
}

impl From<Map<String, Value>> for CredentialRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl CredentialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, RecordError> {
        match serde_json::from_slice::<Value>(data)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(RecordError::NotAnObject),
        }
    }

    pub fn to_vec_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    /// Non-blank string value of `key`, as stored.
    pub fn string_field(&self, key: &str) -> Option<&str> {
        value_as_str(self.fields.get(key))
    }

    pub fn access_token(&self) -> Option<&str> {
        self.string_field(ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.string_field(REFRESH_TOKEN)
    }

    pub fn expiry_date(&self) -> Option<f64> {
        self.fields.get(EXPIRY_DATE).and_then(value_as_f64)
    }

    /// Shallow-merges a token endpoint response over this record.
    ///
    /// A response without a usable `refresh_token` never clears the stored
    /// one, and a bare `expires_in` is turned into a millisecond `expiry_date`.
    pub fn merge_refresh_response(
        &mut self,
        payload: &Map<String, Value>,
        used_refresh_token: &str,
        now: DateTime<Utc>,
    ) {
        for (key, value) in payload {
            if key == REFRESH_TOKEN && value_as_str(Some(value)).is_none() {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }

        if self.refresh_token().is_none() {
            self.fields.insert(
                REFRESH_TOKEN.to_string(),
                Value::String(used_refresh_token.to_string()),
            );
        }

        if !payload.contains_key(EXPIRY_DATE) {
            let expiry_millis = payload
                .get(EXPIRES_IN)
                .and_then(value_as_f64)
                .and_then(|expires_in| expiry_millis_after(now, expires_in));
            if let Some(expiry_millis) = expiry_millis {
                self.fields
                    .insert(EXPIRY_DATE.to_string(), Value::Number(expiry_millis.into()));
            }
        }
    }
}

fn expiry_millis_after(now: DateTime<Utc>, expires_in: f64) -> Option<i64> {
    let lifetime_millis = (expires_in * 1000.0).round();
    if !lifetime_millis.is_finite() || lifetime_millis.abs() >= i64::MAX as f64 {
        return None;
    }
    now.timestamp_millis().checked_add(lifetime_millis as i64)
}

pub(crate) fn value_as_str(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::String(raw)) if !raw.trim().is_empty() => Some(raw.as_str()),
        _ => None,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> CredentialRecord {
        match value {
            Value::Object(fields) => CredentialRecord::from(fields),
            other => panic!("test record must be an object, got {}", other),
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(fields) => fields,
            other => panic!("test payload must be an object, got {}", other),
        }
    }

    #[test]
    fn from_slice_rejects_non_objects() {
        assert!(matches!(
            CredentialRecord::from_slice(b"[1, 2]"),
            Err(RecordError::NotAnObject)
        ));
        assert!(matches!(
            CredentialRecord::from_slice(b"{not json"),
            Err(RecordError::Json(_))
        ));
    }

    #[test]
    fn accessors_ignore_blank_and_mistyped_values() {
        let creds = record(json!({
            "access_token": "  ",
            "refresh_token": 42,
            "expiry_date": "1800000000000",
        }));
        assert_eq!(creds.access_token(), None);
        assert_eq!(creds.refresh_token(), None);
        assert_eq!(creds.expiry_date(), Some(1_800_000_000_000.0));
    }

    #[test]
    fn accessors_return_tokens_as_stored() {
        let creds = record(json!({
            "access_token": "at-with-space ",
            "refresh_token": "\trt-with-tab",
        }));
        assert_eq!(creds.access_token(), Some("at-with-space "));
        assert_eq!(creds.refresh_token(), Some("\trt-with-tab"));
    }

    #[test]
    fn merge_keeps_stored_refresh_token_when_response_omits_it() {
        let mut creds = record(json!({
            "access_token": "old",
            "refresh_token": "rt-stored",
            "resource_url": "portal.qwen.ai",
        }));
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new"})),
            "rt-stored",
            Utc::now(),
        );
        assert_eq!(creds.access_token(), Some("new"));
        assert_eq!(creds.refresh_token(), Some("rt-stored"));
        assert_eq!(creds.string_field("resource_url"), Some("portal.qwen.ai"));
    }

    #[test]
    fn merge_replaces_refresh_token_when_response_rotates_it() {
        let mut creds = record(json!({"refresh_token": "rt-old"}));
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new", "refresh_token": "rt-new"})),
            "rt-old",
            Utc::now(),
        );
        assert_eq!(creds.refresh_token(), Some("rt-new"));
    }

    #[test]
    fn merge_ignores_null_refresh_token_in_response() {
        let mut creds = record(json!({"refresh_token": "rt-stored"}));
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new", "refresh_token": null})),
            "rt-stored",
            Utc::now(),
        );
        assert_eq!(creds.refresh_token(), Some("rt-stored"));
    }

    #[test]
    fn merge_into_empty_record_stores_used_refresh_token() {
        let mut creds = CredentialRecord::new();
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new"})),
            "rt-used",
            Utc::now(),
        );
        assert_eq!(creds.refresh_token(), Some("rt-used"));
    }

    #[test]
    fn merge_synthesizes_millisecond_expiry_from_expires_in() {
        let now = Utc::now();
        let mut creds = record(json!({"expiry_date": 1_000}));
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new", "expires_in": 3600})),
            "rt",
            now,
        );
        let expected = now.timestamp_millis() + 3_600_000;
        assert_eq!(creds.expiry_date(), Some(expected as f64));
    }

    #[test]
    fn merge_skips_expiry_synthesis_for_out_of_range_expires_in() {
        for expires_in in [json!(1e300), json!("inf"), json!("-inf"), json!("NaN")] {
            let mut creds = record(json!({"expiry_date": 1_000}));
            creds.merge_refresh_response(
                &payload(json!({"access_token": "new", "expires_in": expires_in})),
                "rt",
                Utc::now(),
            );
            assert_eq!(creds.access_token(), Some("new"));
            assert_eq!(creds.expiry_date(), Some(1_000.0));
        }
    }

    #[test]
    fn merge_keeps_expiry_date_sent_by_server() {
        let mut creds = CredentialRecord::new();
        creds.merge_refresh_response(
            &payload(json!({
                "access_token": "new",
                "expires_in": 3600,
                "expiry_date": 1_900_000_000_000i64,
            })),
            "rt",
            Utc::now(),
        );
        assert_eq!(creds.expiry_date(), Some(1_900_000_000_000.0));
    }

    #[test]
    fn merge_preserves_unknown_fields_and_their_order() {
        let mut creds = record(json!({
            "zeta": 1,
            "access_token": "old",
            "alpha": {"nested": true},
        }));
        creds.merge_refresh_response(
            &payload(json!({"access_token": "new", "scope": "openid"})),
            "rt",
            Utc::now(),
        );
        let keys: Vec<&str> = creds.fields().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["zeta", "access_token", "alpha", "scope", "refresh_token"]
        );
        assert_eq!(creds.get("alpha"), Some(&json!({"nested": true})));
    }
}
