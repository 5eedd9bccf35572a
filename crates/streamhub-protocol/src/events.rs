//! Known-schema logical events.
//!
//! The hub itself never inspects these; routing is purely string-keyed. The
//! union exists for consumers that want typed access to the handful of events
//! whose shape is known ahead of time, with an opaque fallback so unknown
//! shapes never fail.

use serde::Serialize;
use serde_json::Value;

/// A logical event with a recognized schema, or an opaque fallback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A new post appeared in the feed.
    #[serde(rename = "feed:new_post")]
    FeedNewPost { post: Value },

    /// A feed post was removed.
    #[serde(rename = "feed:post_deleted")]
    FeedPostDeleted { post_id: String },

    /// A new notification for the current user.
    #[serde(rename = "notif:new")]
    NotifNew { notification: Value },

    /// A notification was marked as read.
    #[serde(rename = "notif:read")]
    NotifRead { notification_id: String },

    /// Anything without a recognized schema, carried as-is.
    #[serde(rename = "other")]
    Other { event: String, data: Value },
}

impl StreamEvent {
    /// Classify a dispatched `(event, payload)` pair. Never fails: payloads
    /// that don't match the expected shape degrade to empty fields or to
    /// [`StreamEvent::Other`].
    pub fn classify(event: &str, data: &Value) -> StreamEvent {
        match event {
            "feed:new_post" => StreamEvent::FeedNewPost {
                post: data.get("post").cloned().unwrap_or(Value::Null),
            },
            "feed:post_deleted" => StreamEvent::FeedPostDeleted {
                post_id: str_field(data, "post_id"),
            },
            "notif:new" => StreamEvent::NotifNew {
                notification: data.get("notification").cloned().unwrap_or(Value::Null),
            },
            "notif:read" => StreamEvent::NotifRead {
                notification_id: str_field(data, "notification_id"),
            },
            _ => StreamEvent::Other {
                event: event.to_string(),
                data: data.clone(),
            },
        }
    }

    /// The logical event name this variant corresponds to.
    pub fn event_name(&self) -> &str {
        match self {
            StreamEvent::FeedNewPost { .. } => "feed:new_post",
            StreamEvent::FeedPostDeleted { .. } => "feed:post_deleted",
            StreamEvent::NotifNew { .. } => "notif:new",
            StreamEvent::NotifRead { .. } => "notif:read",
            StreamEvent::Other { event, .. } => event,
        }
    }
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
