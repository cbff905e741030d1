/// Outbound gateway event frames
use crate::notifications::NotificationView;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events pushed to live connections. Per-socket ordering is the only
/// delivery guarantee.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// A freshly created notification, sent to the recipient's personal group
    NewNotification {
        data: NotificationView,
        timestamp: DateTime<Utc>,
    },

    /// Refreshed unread-notification count for the recipient
    UnreadCount {
        count: i64,
        timestamp: DateTime<Utc>,
    },

    /// Live counter refresh for a thread, sent to its topic group or to the
    /// author's personal group
    ThreadUpdate {
        thread_id: String,
        #[serde(flatten)]
        fields: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A new reply landed on a thread the subscriber watches
    NewReply {
        thread_id: String,
        reply_id: String,
        author_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A like landed on a thread the subscriber watches
    NewLike {
        thread_id: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Operator broadcast to every live connection
    SystemNotification {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = GatewayEvent::UnreadCount {
            count: 3,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "unread_count");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn thread_update_flattens_fields() {
        let event = GatewayEvent::ThreadUpdate {
            thread_id: "t1".to_string(),
            fields: json!({"likesCount": 5}),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "thread_update");
        assert_eq!(value["threadId"], "t1");
        assert_eq!(value["likesCount"], 5);
    }
}
