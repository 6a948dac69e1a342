use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Property catalog row. Keyed by an externally assigned string id, joined
/// loosely from leads via `listing_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: String,
    /// apartment, house, lot, commercial...
    pub kind: String,
    /// Centavos.
    pub price: i64,
    pub city: String,
    pub neighborhood: String,
    /// Media references (photo/video URLs) as stored.
    pub media: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
