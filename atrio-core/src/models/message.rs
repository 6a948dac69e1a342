use atrio_sync::KeyedRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message on the channel: the human counterpart or the
/// AI/SDR side of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "message_direction", rename_all = "lowercase")]
pub enum Direction {
    Human,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub instance_id: String,
    pub session_id: String,
    pub direction: Direction,
    pub content: String,
    pub tool_meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl KeyedRow for Message {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn activity_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
