//! The notification record and its display helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One notification, whether fetched from the server or pushed live.
///
/// `id` is the merge key regardless of origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Unique identifier, used for deduplication.
    pub id: String,
    /// Board item the notification concerns.
    pub subject_id: i64,
    /// Human-readable text.
    pub text: String,
    /// Whether the user has seen it.
    pub read: bool,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Creates an unread record.
    pub fn unread(
        id: impl Into<String>,
        subject_id: i64,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id,
            text: text.into(),
            read: false,
            created_at,
        }
    }
}

/// Relative age label for a timestamp ("just now", "5 minutes ago", ...).
///
/// Months count 30 days and years 365 days. Timestamps in the future are
/// treated as "just now".
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }

    let days = hours / 24;
    if days < 7 {
        return plural(days, "day");
    }

    let weeks = days / 7;
    if weeks < 4 {
        return plural(weeks, "week");
    }

    let months = days / 30;
    if months < 12 {
        return plural(months.max(1), "month");
    }

    plural(days / 365, "year")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_cache_serialization_uses_camel_case() {
        let record = NotificationRecord::unread("n1", 42, "New comment", at(0));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subjectId"], 42);
        assert_eq!(json["read"], false);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_time_ago_buckets() {
        let now = at(0);
        assert_eq!(time_ago(now - Duration::seconds(30), now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(time_ago(now - Duration::minutes(45), now), "45 minutes ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2 days ago");
        assert_eq!(time_ago(now - Duration::days(14), now), "2 weeks ago");
        assert_eq!(time_ago(now - Duration::days(90), now), "3 months ago");
        assert_eq!(time_ago(now - Duration::days(800), now), "2 years ago");
    }

    #[test]
    fn test_time_ago_future_is_just_now() {
        let now = at(0);
        assert_eq!(time_ago(now + Duration::hours(1), now), "just now");
    }
}
