use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only trace written alongside every mutation and relay attempt.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
