//! Translation of push payloads into notification records.
//!
//! Two payload shapes are accepted for each event:
//!
//! - the broadcast shape sent by the board server
//!   (`chat.created`: `{chat: {message_id, content, user: {name}}}`,
//!   `message.created`: `{id, title, creator: {name}}`)
//! - a flat shape `{actorName, subjectId, text}`
//!
//! A payload may carry `recipient_id` or `notification_id`; when present it
//! becomes the record id. `recipient_id` is preferred because it is the id
//! the server list uses, so the pushed record merges with the fetched one.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::EventKind;
use crate::notifications::NotificationRecord;
use crate::server::types::parse_timestamp;

/// A push payload that failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedEventError {
    /// The payload was a string that is not JSON.
    InvalidJson(String),
    /// The payload is not a JSON object.
    NotAnObject,
    /// A required field is missing or has the wrong type.
    MissingField(&'static str),
}

impl std::fmt::Display for MalformedEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Payload is not valid JSON: {msg}"),
            Self::NotAnObject => write!(f, "Payload is not an object"),
            Self::MissingField(field) => write!(f, "Payload is missing `{field}`"),
        }
    }
}

impl std::error::Error for MalformedEventError {}

/// A validated push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Which event this is.
    pub kind: EventKind,
    /// Server notification id, when the payload names one.
    pub notification_id: Option<String>,
    /// Id of the comment itself (`chat.id`), when present.
    pub comment_id: Option<String>,
    /// Board item the event refers to.
    pub subject_id: i64,
    /// Who caused the event.
    pub actor_name: String,
    /// Comment content or item title.
    pub text: String,
    /// Event time, when the payload carries one.
    pub created_at: Option<DateTime<Utc>>,
}

impl PushEvent {
    /// Validates a payload for `kind`.
    pub fn parse(kind: EventKind, data: &Value) -> Result<Self, MalformedEventError> {
        // Pusher delivers `data` as a JSON-encoded string.
        let decoded;
        let data = match data {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw)
                    .map_err(|e| MalformedEventError::InvalidJson(e.to_string()))?;
                &decoded
            }
            other => other,
        };
        if !data.is_object() {
            return Err(MalformedEventError::NotAnObject);
        }

        let notification_id = ["recipient_id", "notification_id"]
            .iter()
            .find_map(|key| id_string(data.get(*key)?));

        if data.get("actorName").is_some() || data.get("subjectId").is_some() {
            return Ok(Self {
                kind,
                notification_id,
                comment_id: None,
                subject_id: data
                    .get("subjectId")
                    .and_then(id_number)
                    .ok_or(MalformedEventError::MissingField("subjectId"))?,
                actor_name: string_field(data, "actorName")?,
                text: string_field(data, "text")?,
                created_at: data.get("createdAt").and_then(parse_timestamp),
            });
        }

        match kind {
            EventKind::CommentCreated => {
                let chat = data
                    .get("chat")
                    .filter(|c| c.is_object())
                    .ok_or(MalformedEventError::MissingField("chat"))?;
                Ok(Self {
                    kind,
                    notification_id,
                    comment_id: chat.get("id").and_then(id_string),
                    subject_id: chat
                        .get("message_id")
                        .and_then(id_number)
                        .ok_or(MalformedEventError::MissingField("chat.message_id"))?,
                    actor_name: chat
                        .pointer("/user/name")
                        .and_then(Value::as_str)
                        .ok_or(MalformedEventError::MissingField("chat.user.name"))?
                        .to_string(),
                    text: chat
                        .get("content")
                        .and_then(Value::as_str)
                        .ok_or(MalformedEventError::MissingField("chat.content"))?
                        .to_string(),
                    created_at: chat.get("created_at").and_then(parse_timestamp),
                })
            }
            EventKind::ItemCreated => Ok(Self {
                kind,
                notification_id,
                comment_id: None,
                subject_id: data
                    .get("id")
                    .and_then(id_number)
                    .ok_or(MalformedEventError::MissingField("id"))?,
                actor_name: data
                    .pointer("/creator/name")
                    .and_then(Value::as_str)
                    .ok_or(MalformedEventError::MissingField("creator.name"))?
                    .to_string(),
                text: string_field(data, "title")?,
                created_at: data.get("created_at").and_then(parse_timestamp),
            }),
        }
    }

    /// Builds the notification record for this event. `now` stands in for
    /// a missing event time.
    ///
    /// Without a server id the record is keyed `{kind}:{subject_id}`, plus
    /// `:{comment_id}` for comments that carry one. Such a key never equals a
    /// fetched record's id, so the same notification can show up once pushed
    /// and once fetched. Comments without an id on the same item share one
    /// key and only the first is kept.
    pub fn into_record(self, now: DateTime<Utc>) -> NotificationRecord {
        let id = self.notification_id.unwrap_or_else(|| match &self.comment_id {
            Some(comment) => format!("{}:{}:{comment}", self.kind.as_str(), self.subject_id),
            None => format!("{}:{}", self.kind.as_str(), self.subject_id),
        });
        let text = match self.kind {
            EventKind::CommentCreated => {
                format!("New comment from {}: {}", self.actor_name, self.text)
            }
            EventKind::ItemCreated => {
                format!("New item from {}: {}", self.actor_name, self.text)
            }
        };
        NotificationRecord::unread(id, self.subject_id, text, self.created_at.unwrap_or(now))
    }
}

/// Validates and translates one payload into exactly one record.
pub fn translate(
    kind: EventKind,
    data: &Value,
    now: DateTime<Utc>,
) -> Result<NotificationRecord, MalformedEventError> {
    PushEvent::parse(kind, data).map(|event| event.into_record(now))
}

fn string_field(data: &Value, field: &'static str) -> Result<String, MalformedEventError> {
    data.get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or(MalformedEventError::MissingField(field))
}

fn id_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_comment_broadcast_shape() {
        let data = json!({
            "chat": {
                "message_id": 42,
                "content": "Looks good",
                "user": { "name": "Ada" }
            }
        });

        let record = translate(EventKind::CommentCreated, &data, now()).unwrap();
        assert_eq!(record.id, "comment-created:42");
        assert_eq!(record.subject_id, 42);
        assert_eq!(record.text, "New comment from Ada: Looks good");
        assert!(!record.read);
        assert_eq!(record.created_at, now());
    }

    #[test]
    fn test_comment_id_keeps_comments_on_one_item_apart() {
        let comment = |id: i64| {
            json!({
                "chat": {
                    "id": id,
                    "message_id": 42,
                    "content": "again",
                    "user": { "name": "Ada" }
                }
            })
        };

        let first = translate(EventKind::CommentCreated, &comment(5), now()).unwrap();
        let second = translate(EventKind::CommentCreated, &comment(6), now()).unwrap();
        assert_eq!(first.id, "comment-created:42:5");
        assert_eq!(second.id, "comment-created:42:6");
    }

    #[test]
    fn test_recipient_id_preferred_over_notification_id() {
        let data = json!({
            "id": 17,
            "title": "Printer broken",
            "creator": { "name": "Grace" },
            "notification_id": 3,
            "recipient_id": 901
        });

        let record = translate(EventKind::ItemCreated, &data, now()).unwrap();
        assert_eq!(record.id, "901");
    }

    #[test]
    fn test_item_broadcast_shape_with_notification_id() {
        let data = json!({
            "id": "17",
            "title": "Printer broken",
            "creator": { "name": "Grace" },
            "recipient_id": 901,
            "created_at": "2024-05-01T10:00:00Z"
        });

        let record = translate(EventKind::ItemCreated, &data, now()).unwrap();
        assert_eq!(record.id, "901");
        assert_eq!(record.subject_id, 17);
        assert_eq!(record.text, "New item from Grace: Printer broken");
        assert_eq!(record.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_flat_shape() {
        let data = json!({ "actorName": "Linus", "subjectId": 5, "text": "hello" });
        let event = PushEvent::parse(EventKind::CommentCreated, &data).unwrap();
        assert_eq!(event.actor_name, "Linus");
        assert_eq!(event.subject_id, 5);
        assert_eq!(event.text, "hello");
        assert!(event.notification_id.is_none());
    }

    #[test]
    fn test_string_encoded_payload() {
        let data = Value::String(r#"{"id":3,"title":"t","creator":{"name":"n"}}"#.to_string());
        let record = translate(EventKind::ItemCreated, &data, now()).unwrap();
        assert_eq!(record.subject_id, 3);
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(
            translate(EventKind::CommentCreated, &json!([1, 2]), now()).unwrap_err(),
            MalformedEventError::NotAnObject
        );
        assert_eq!(
            translate(EventKind::CommentCreated, &json!({ "chat": { "content": "x" } }), now())
                .unwrap_err(),
            MalformedEventError::MissingField("chat.message_id")
        );
        assert_eq!(
            translate(EventKind::ItemCreated, &json!({ "id": 1, "title": "t" }), now())
                .unwrap_err(),
            MalformedEventError::MissingField("creator.name")
        );
        assert_eq!(
            translate(
                EventKind::ItemCreated,
                &json!({ "actorName": "a", "subjectId": "x", "text": "t" }),
                now()
            )
            .unwrap_err(),
            MalformedEventError::MissingField("subjectId")
        );
        assert!(matches!(
            translate(EventKind::ItemCreated, &Value::String("{oops".to_string()), now()),
            Err(MalformedEventError::InvalidJson(_))
        ));
    }
}
