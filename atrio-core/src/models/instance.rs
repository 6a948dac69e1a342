use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel identity: one messaging-line account (a broker's number or a
/// shared SDR line) that owns zero or more sessions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    pub id: String,
    pub label: String,
    pub phone_number: String,
    pub owner_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
