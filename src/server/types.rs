//! Wire types for the board API.
//!
//! This module defines the data structures used for serialization and
//! deserialization when communicating with the server, and their mapping to
//! [`NotificationRecord`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::RequestError;
use crate::auth::User;
use crate::notifications::NotificationRecord;

/// Identifier that may arrive as a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl WireId {
    /// Numeric value, parsing string ids when possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parses the timestamp shapes the server and push payloads use.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` (taken as UTC) and Unix
/// epoch milliseconds.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    parse_timestamp(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}")))
}

/// Message (board item) a notification points at.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    /// Board item id.
    pub id: WireId,
}

/// The notification itself, shared by all its recipients.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationBody {
    /// Notification id.
    #[serde(default)]
    pub id: Option<WireId>,
    /// Short title.
    #[serde(default)]
    pub title: Option<String>,
    /// Longer body, used when there is no title.
    #[serde(default)]
    pub body: Option<String>,
    /// Creation time.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Board item reference.
    pub message: MessageRef,
}

/// One entry of `GET /notifications`: a notification as seen by one recipient.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientEntry {
    /// Per-recipient id; the read/delete endpoints address this id.
    pub recipient_id: WireId,
    /// Set once the recipient has read it.
    #[serde(default)]
    pub read_at: Option<serde_json::Value>,
    /// The notification.
    pub notification: NotificationBody,
}

impl RecipientEntry {
    /// Maps the wire entry to a record. Returns `None` when the item id is
    /// not numeric.
    pub fn into_record(self) -> Option<NotificationRecord> {
        let subject_id = self.notification.message.id.as_i64()?;
        let text = self
            .notification
            .title
            .filter(|t| !t.is_empty())
            .or(self.notification.body)
            .unwrap_or_default();
        Some(NotificationRecord {
            id: self.recipient_id.to_string(),
            subject_id,
            text,
            read: self.read_at.is_some_and(|v| !v.is_null()),
            created_at: self.notification.created_at,
        })
    }
}

/// Decodes a `GET /notifications` body: a bare array or `{ "data": [...] }`.
///
/// Entries that fail to decode are skipped with a warning so one bad row
/// does not hide the rest.
pub fn parse_notification_list(
    body: serde_json::Value,
) -> Result<Vec<NotificationRecord>, RequestError> {
    let entries = match body {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => {
                return Err(RequestError::Decode(
                    "notification list has no data array".to_string(),
                ))
            }
        },
        other => {
            return Err(RequestError::Decode(format!(
                "expected notification list, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<RecipientEntry>(entry) {
            Ok(entry) => match entry.into_record() {
                Some(record) => records.push(record),
                None => log::warn!("[Api] Skipping notification with non-numeric item id"),
            },
            Err(e) => log::warn!("[Api] Skipping malformed notification entry: {e}"),
        }
    }
    Ok(records)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// `POST /login` request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Account email.
    pub email: &'a str,
    /// Account password.
    pub password: &'a str,
}

/// `POST /login` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// The logged-in user.
    pub user: User,
}

/// Private channel authorization request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelAuthRequest<'a> {
    /// Socket id announced by the push server.
    pub socket_id: &'a str,
    /// Full channel name, e.g. `private-user.7`.
    pub channel_name: &'a str,
}

/// Private channel authorization response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelAuthResponse {
    /// Signature passed along with `pusher:subscribe`.
    pub auth: String,
}
