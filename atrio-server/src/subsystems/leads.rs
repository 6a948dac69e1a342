//! Lead pipeline — kanban queries and mutations
//!
//! Every mutation writes an audit entry. Stage drags and bulk reassignment
//! are the hot paths from the board UI; both return the updated rows so the
//! caller can merge them optimistically instead of refetching.

use atrio_core::models::{Lead, LeadStage, Principal};
use atrio_sync::{Page, PageCursor};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::subsystems::audit;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub fn clamp_limit(limit: Option<u32>) -> i64 {
    limit
        .map(|l| (l as i64).clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub stage: Option<LeadStage>,
    pub assigned_agent: Option<String>,
    pub estimated_value: Option<i64>,
    pub notes: Option<String>,
    pub listing_id: Option<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub stage: Option<LeadStage>,
    pub assigned_agent: Option<String>,
    pub estimated_value: Option<i64>,
    pub notes: Option<String>,
    pub listing_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassignReport {
    pub updated: Vec<Uuid>,
    pub missing: Vec<Uuid>,
}

/// Leads visible to the caller, most recently touched first.
pub async fn list(
    pool: &PgPool,
    principal: &Principal,
    stage: Option<LeadStage>,
    cursor: Option<&PageCursor>,
    limit: Option<u32>,
) -> Result<Page<Lead>, sqlx::Error> {
    let limit = clamp_limit(limit);

    let cursor_id = match cursor {
        Some(c) => Some(parse_lead_id(&c.id)?),
        None => None,
    };

    let mut rows = sqlx::query_as::<_, Lead>(
        r#"
        SELECT id, name, phone, email, stage, assigned_agent, estimated_value,
               notes, listing_id, created_at, updated_at
        FROM leads
        WHERE ($1::lead_stage IS NULL OR stage = $1)
          AND ($2::boolean OR assigned_agent = $3)
          AND ($4::timestamptz IS NULL OR (updated_at, id) < ($4, $5))
        ORDER BY updated_at DESC, id DESC
        LIMIT $6
        "#,
    )
    .bind(stage)
    .bind(principal.sees_all())
    .bind(&principal.actor)
    .bind(cursor.map(|c| c.ts))
    .bind(cursor_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    hydrate_agent_names(pool, &mut rows).await?;

    Ok(Page::from_rows(rows, limit as usize, |l| {
        PageCursor::new(l.updated_at, l.id)
    }))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        r#"
        SELECT id, name, phone, email, stage, assigned_agent, estimated_value,
               notes, listing_id, created_at, updated_at
        FROM leads
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn create(pool: &PgPool, new: &NewLead, actor: &str) -> Result<Lead, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (name, phone, email, stage, assigned_agent, estimated_value, notes, listing_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, name, phone, email, stage, assigned_agent, estimated_value,
                  notes, listing_id, created_at, updated_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.phone)
    .bind(&new.email)
    .bind(new.stage.unwrap_or(LeadStage::New))
    .bind(&new.assigned_agent)
    .bind(new.estimated_value)
    .bind(&new.notes)
    .bind(&new.listing_id)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        actor,
        "lead.created",
        "leads",
        &lead.id.to_string(),
        serde_json::json!({"stage": lead.stage}),
    )
    .await?;

    tx.commit().await?;
    Ok(lead)
}

/// Apply a patch. Returns `None` when the lead does not exist. A stage
/// change gets its own audit action so pipeline history stays queryable.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    patch: &LeadPatch,
    actor: &str,
) -> Result<Option<Lead>, sqlx::Error> {
    let Some(before) = get(pool, id).await? else {
        return Ok(None);
    };

    let mut tx = pool.begin().await?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        UPDATE leads SET
            name            = COALESCE($2, name),
            phone           = COALESCE($3, phone),
            email           = COALESCE($4, email),
            stage           = COALESCE($5, stage),
            assigned_agent  = COALESCE($6, assigned_agent),
            estimated_value = COALESCE($7, estimated_value),
            notes           = COALESCE($8, notes),
            listing_id      = COALESCE($9, listing_id),
            updated_at      = now()
        WHERE id = $1
        RETURNING id, name, phone, email, stage, assigned_agent, estimated_value,
                  notes, listing_id, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&patch.name)
    .bind(&patch.phone)
    .bind(&patch.email)
    .bind(patch.stage)
    .bind(&patch.assigned_agent)
    .bind(patch.estimated_value)
    .bind(&patch.notes)
    .bind(&patch.listing_id)
    .fetch_one(&mut *tx)
    .await?;

    let (action, meta) = match patch.stage {
        Some(to) if to != before.stage => (
            "lead.stage_changed",
            serde_json::json!({"from": before.stage, "to": to}),
        ),
        _ => ("lead.updated", serde_json::json!({})),
    };
    audit::record(&mut *tx, actor, action, "leads", &id.to_string(), meta).await?;

    tx.commit().await?;
    Ok(Some(lead))
}

/// Bulk reassignment from the board. Each lead gets its own audit entry;
/// ids that no longer exist are reported back rather than failing the batch.
pub async fn reassign(
    pool: &PgPool,
    ids: &[Uuid],
    new_agent: &str,
    actor: &str,
) -> Result<ReassignReport, sqlx::Error> {
    let mut report = ReassignReport {
        updated: Vec::new(),
        missing: Vec::new(),
    };

    for &id in ids {
        let mut tx = pool.begin().await?;
        let updated = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET assigned_agent = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, name, phone, email, stage, assigned_agent, estimated_value,
                      notes, listing_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(new_agent)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(_) => {
                audit::record(
                    &mut *tx,
                    actor,
                    "lead.reassigned",
                    "leads",
                    &id.to_string(),
                    serde_json::json!({"to": new_agent}),
                )
                .await?;
                tx.commit().await?;
                report.updated.push(id);
            }
            None => {
                tx.rollback().await?;
                report.missing.push(id);
            }
        }
    }

    tracing::info!(
        updated = report.updated.len(),
        missing = report.missing.len(),
        new_agent,
        "Bulk reassignment finished"
    );
    Ok(report)
}

/// Patch display names for assigned agents into the rows. Runs after the
/// fetch (and after reassignment merges) instead of blocking them.
pub async fn hydrate_agent_names(pool: &PgPool, leads: &mut [Lead]) -> Result<(), sqlx::Error> {
    let mut agent_ids: Vec<String> = leads
        .iter()
        .filter_map(|l| l.assigned_agent.clone())
        .collect();
    agent_ids.sort();
    agent_ids.dedup();
    if agent_ids.is_empty() {
        return Ok(());
    }

    let names: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, display_name FROM agents WHERE id = ANY($1)",
    )
    .bind(&agent_ids)
    .fetch_all(pool)
    .await?;

    for lead in leads.iter_mut() {
        if let Some(agent) = &lead.assigned_agent {
            lead.assigned_agent_name = names
                .iter()
                .find(|(id, _)| id == agent)
                .map(|(_, name)| name.clone());
        }
    }
    Ok(())
}

fn parse_lead_id(raw: &str) -> Result<Uuid, sqlx::Error> {
    raw.parse()
        .map_err(|e| sqlx::Error::Decode(format!("bad lead cursor id: {}", e).into()))
}
