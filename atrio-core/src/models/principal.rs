use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::instance::Instance;
use super::lead::Lead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Agent,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "agent" => Ok(Role::Agent),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The caller, as asserted by the gateway in front of us. Row security on
/// the database is the authoritative enforcement; these predicates are
/// re-applied locally after every fetch and merge.
#[derive(Debug, Clone)]
pub struct Principal {
    pub actor: String,
    pub role: Role,
}

impl Principal {
    pub fn new(actor: impl Into<String>, role: Role) -> Self {
        Self {
            actor: actor.into(),
            role,
        }
    }

    /// From the `x-atrio-actor` / `x-atrio-role` headers. Absent or
    /// unparseable headers fall back to an unrestricted system principal
    /// (local tooling); the database still has the final word.
    pub fn from_headers(actor: Option<&str>, role: Option<&str>) -> Self {
        let role = role
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Admin);
        Self {
            actor: actor.unwrap_or("system").to_string(),
            role,
        }
    }

    pub fn sees_all(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Manager)
    }

    /// Agents see only leads assigned to them.
    pub fn can_see_lead(&self, lead: &Lead) -> bool {
        self.sees_all() || lead.assigned_agent.as_deref() == Some(self.actor.as_str())
    }

    /// Agents see only instances (and therefore sessions) they own.
    pub fn can_see_instance(&self, instance: &Instance) -> bool {
        self.sees_all() || instance.owner_agent.as_deref() == Some(self.actor.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn lead_for(agent: Option<&str>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            name: "Maria".to_string(),
            phone: "+5511999990000".to_string(),
            email: None,
            stage: super::super::lead::LeadStage::New,
            assigned_agent: agent.map(str::to_string),
            assigned_agent_name: None,
            estimated_value: None,
            notes: None,
            listing_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_agent_sees_only_own_leads() {
        let principal = Principal::new("ana", Role::Agent);
        assert!(principal.can_see_lead(&lead_for(Some("ana"))));
        assert!(!principal.can_see_lead(&lead_for(Some("rui"))));
        assert!(!principal.can_see_lead(&lead_for(None)));
    }

    #[test]
    fn test_manager_sees_everything() {
        let principal = Principal::new("gestor", Role::Manager);
        assert!(principal.can_see_lead(&lead_for(Some("rui"))));
        assert!(principal.can_see_lead(&lead_for(None)));
    }

    #[test]
    fn test_missing_headers_fall_back_to_system_admin() {
        let principal = Principal::from_headers(None, None);
        assert_eq!(principal.actor, "system");
        assert!(principal.sees_all());
    }

    #[test]
    fn test_bad_role_header_falls_back() {
        let principal = Principal::from_headers(Some("ana"), Some("chefe"));
        assert!(principal.sees_all());
    }
}
