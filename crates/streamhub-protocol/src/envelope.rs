//! Channel set and envelope decoding.
//!
//! A frame body is either empty or a JSON-encoded object, by convention
//! carrying a `type` string field that names the logical event. Nothing here
//! validates domain payloads; malformed bodies are reported as `None` and the
//! caller decides whether to drop or pass through.

use serde_json::Value;

/// Logical event type used for frames that arrive without a channel tag.
///
/// This matches the default SSE event name, which is what untagged frames
/// are delivered as.
pub const GENERIC_EVENT: &str = "message";

/// A named server-push topic multiplexed over the single connection.
///
/// The set is fixed and known at connect time; unknown tags are not routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Feed activity (`feed_events`).
    Feed,
    /// Notification activity (`notif_events`).
    Notifications,
}

impl Channel {
    /// Every channel the hub attaches a decoder for.
    pub const ALL: [Channel; 2] = [Channel::Feed, Channel::Notifications];

    /// The wire tag for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Feed => "feed_events",
            Channel::Notifications => "notif_events",
        }
    }

    /// Resolve a wire tag back to a channel, if it is a known one.
    pub fn parse(tag: &str) -> Option<Channel> {
        Channel::ALL.iter().copied().find(|c| c.as_str() == tag)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a channel frame body.
///
/// Returns `None` when the body is not valid JSON or decodes to a falsy
/// value (`null`, `false`, `0`, `""`), mirroring the truthiness check the
/// browser client applied before dispatching.
pub fn decode_body(body: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(body).ok()?;
    if is_falsy(&value) { None } else { Some(value) }
}

/// Determine the logical event type for a decoded payload.
///
/// The payload's `type` field wins when it is a non-empty string; otherwise
/// the channel name itself is the dispatch key.
pub fn resolve_event_type<'a>(payload: &'a Value, channel: &'a str) -> &'a str {
    payload
        .get("type")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(channel)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_roundtrip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::parse(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::parse("presence_events"), None);
        assert_eq!(Channel::parse(""), None);
    }

    #[test]
    fn test_decode_body_rejects_invalid_json() {
        assert!(decode_body("not json").is_none());
        assert!(decode_body("").is_none());
        assert!(decode_body("{truncated").is_none());
    }

    #[test]
    fn test_decode_body_rejects_falsy_values() {
        assert!(decode_body("null").is_none());
        assert!(decode_body("false").is_none());
        assert!(decode_body("0").is_none());
        assert!(decode_body("\"\"").is_none());
    }

    #[test]
    fn test_decode_body_accepts_truthy_values() {
        assert_eq!(decode_body("{\"foo\":1}"), Some(json!({"foo": 1})));
        assert_eq!(decode_body("[]"), Some(json!([])));
        assert_eq!(decode_body("true"), Some(json!(true)));
        assert_eq!(decode_body("42"), Some(json!(42)));
    }

    #[test]
    fn test_resolve_event_type_prefers_type_field() {
        let payload = json!({"type": "feed:new_post", "post": {"id": 42}});
        assert_eq!(resolve_event_type(&payload, "feed_events"), "feed:new_post");
    }

    #[test]
    fn test_resolve_event_type_falls_back_to_channel() {
        assert_eq!(resolve_event_type(&json!({"foo": 1}), "feed_events"), "feed_events");
        // Empty and non-string type fields are not usable dispatch keys.
        assert_eq!(resolve_event_type(&json!({"type": ""}), "notif_events"), "notif_events");
        assert_eq!(resolve_event_type(&json!({"type": 7}), "notif_events"), "notif_events");
    }
}
