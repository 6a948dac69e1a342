use std::fmt;
use std::str::FromStr;

use atrio_sync::KeyedRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage of a lead. Stored as snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_stage", rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Contacted,
    Visiting,
    Proposal,
    Closed,
    Lost,
}

impl fmt::Display for LeadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeadStage::New => "new",
            LeadStage::Contacted => "contacted",
            LeadStage::Visiting => "visiting",
            LeadStage::Proposal => "proposal",
            LeadStage::Closed => "closed",
            LeadStage::Lost => "lost",
        };
        f.write_str(s)
    }
}

impl FromStr for LeadStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStage::New),
            "contacted" => Ok(LeadStage::Contacted),
            "visiting" => Ok(LeadStage::Visiting),
            "proposal" => Ok(LeadStage::Proposal),
            "closed" => Ok(LeadStage::Closed),
            "lost" => Ok(LeadStage::Lost),
            other => Err(format!("unknown lead stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub stage: LeadStage,
    pub assigned_agent: Option<String>,
    /// Display metadata for the assigned agent; not a column — hydrated
    /// after fetch/reassignment from the agents table.
    #[sqlx(default)]
    #[serde(default)]
    pub assigned_agent_name: Option<String>,
    /// Centavos.
    pub estimated_value: Option<i64>,
    pub notes: Option<String>,
    /// Loose string reference into the listings catalog; no FK enforced.
    pub listing_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyedRow for Lead {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }

    fn activity_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trips_through_strings() {
        for stage in [
            LeadStage::New,
            LeadStage::Contacted,
            LeadStage::Visiting,
            LeadStage::Proposal,
            LeadStage::Closed,
            LeadStage::Lost,
        ] {
            let parsed: LeadStage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!("quente".parse::<LeadStage>().is_err());
    }
}
