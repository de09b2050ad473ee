use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emotion::EmotionSummary;

/// Where a record was last read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// One persisted user/companion exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
    /// Locally generated id (`local_<uuid>`)
    pub id: String,
    /// Remote document id once the remote write succeeded
    #[serde(default)]
    pub remote_id: Option<String>,
    pub user_id: String,
    pub transcript: String,
    pub ai_response: String,
    pub primary_emotion: String,
    #[serde(default)]
    pub emotion_snapshot: Option<EmotionSummary>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
}

impl ConversationExchange {
    pub fn new(
        user_id: impl Into<String>,
        transcript: impl Into<String>,
        ai_response: impl Into<String>,
        primary_emotion: impl Into<String>,
        emotion_snapshot: Option<EmotionSummary>,
    ) -> Self {
        let now = Utc::now();
        // Stored at millisecond precision, so keep the in-memory copy identical
        let timestamp = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        Self {
            id: format!("local_{}", Uuid::new_v4()),
            remote_id: None,
            user_id: user_id.into(),
            transcript: transcript.into(),
            ai_response: ai_response.into(),
            primary_emotion: primary_emotion.into(),
            emotion_snapshot,
            timestamp,
            origin: Origin::Local,
        }
    }
}

/// Document shape written to and read from the remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RemoteRecord {
    #[serde(default)]
    pub local_id: Option<String>,
    pub user_id: String,
    pub transcript: String,
    pub ai_response: String,
    pub primary_emotion: String,
    #[serde(default)]
    pub emotion_snapshot: Option<EmotionSummary>,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl From<&ConversationExchange> for RemoteRecord {
    fn from(exchange: &ConversationExchange) -> Self {
        Self {
            local_id: Some(exchange.id.clone()),
            user_id: exchange.user_id.clone(),
            transcript: exchange.transcript.clone(),
            ai_response: exchange.ai_response.clone(),
            primary_emotion: exchange.primary_emotion.clone(),
            emotion_snapshot: exchange.emotion_snapshot.clone(),
            timestamp: exchange.timestamp.timestamp_millis(),
        }
    }
}

impl RemoteRecord {
    pub fn into_exchange(self, remote_id: String) -> ConversationExchange {
        ConversationExchange {
            id: self
                .local_id
                .unwrap_or_else(|| format!("local_{}", Uuid::new_v4())),
            remote_id: Some(remote_id),
            user_id: self.user_id,
            transcript: self.transcript,
            ai_response: self.ai_response,
            primary_emotion: self.primary_emotion,
            emotion_snapshot: self.emotion_snapshot,
            timestamp: DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default(),
            origin: Origin::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_exchange_ids() {
        let a = ConversationExchange::new("u1", "hi", "hello", "happy", None);
        let b = ConversationExchange::new("u1", "hi", "hello", "happy", None);
        assert!(a.id.starts_with("local_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.origin, Origin::Local);
        assert!(a.remote_id.is_none());
    }

    #[test]
    fn test_remote_record_keeps_local_id() {
        let exchange = ConversationExchange::new("u1", "hi", "hello", "sad", None);
        let restored = RemoteRecord::from(&exchange).into_exchange("doc-1".to_string());

        assert_eq!(restored.id, exchange.id);
        assert_eq!(restored.remote_id.as_deref(), Some("doc-1"));
        assert_eq!(restored.timestamp, exchange.timestamp);
        assert_eq!(restored.origin, Origin::Remote);
    }
}
