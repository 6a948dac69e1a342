use atrio_sync::KeyedRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chat session, derived by grouping messages — there is no stored
/// conversations table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub session_id: String,
    pub instance_id: String,
    /// Content of the latest message, for the inbox preview.
    pub last_message: String,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: i64,
}

impl KeyedRow for ConversationSummary {
    type Key = String;

    fn key(&self) -> String {
        self.session_id.clone()
    }

    fn activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }
}
