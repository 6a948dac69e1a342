//! Message history and sending
//!
//! Messages are presented oldest-first within a session. The initial page
//! is the latest slice of history; `Backward` pages load older messages
//! (scroll-up) and `Forward` pages load anything newer than the cursor
//! (catch-up after a resync). Sends are transactional with their audit
//! entry.

use atrio_core::models::{Direction as MessageDirection, Message};
use atrio_sync::{cursor::Direction, Page, PageCursor};
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

/// One page of a session's history.
///
/// Without a cursor this returns the newest `limit` messages. With a cursor,
/// `Backward` walks into older history and `Forward` returns newer rows in
/// ascending order. Rows always come back chronologically ascending; the
/// next cursor always points at the boundary row in fetch order.
pub async fn page(
    pool: &PgPool,
    session_id: &str,
    cursor: Option<&PageCursor>,
    direction: Direction,
    limit: Option<u32>,
) -> Result<Page<Message>, sqlx::Error> {
    let limit = clamp_limit(limit);

    let cursor_id = match cursor {
        Some(c) => Some(parse_message_id(&c.id)?),
        None => None,
    };
    let cursor_ts = cursor.map(|c| c.ts);

    let (fetched, descending) = match (cursor, direction) {
        // Latest slice of history, fetched newest-first.
        (None, _) => (
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, instance_id, session_id, direction, content, tool_meta, created_at
                FROM messages
                WHERE session_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
                "#,
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(pool)
            .await?,
            true,
        ),
        // Older history: continue below the cursor, newest-first.
        (Some(_), Direction::Backward) => (
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, instance_id, session_id, direction, content, tool_meta, created_at
                FROM messages
                WHERE session_id = $1
                  AND (created_at, id) < ($2, $3)
                ORDER BY created_at DESC, id DESC
                LIMIT $4
                "#,
            )
            .bind(session_id)
            .bind(cursor_ts)
            .bind(cursor_id)
            .bind(limit)
            .fetch_all(pool)
            .await?,
            true,
        ),
        // Newer rows after the cursor, already ascending.
        (Some(_), Direction::Forward) => (
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, instance_id, session_id, direction, content, tool_meta, created_at
                FROM messages
                WHERE session_id = $1
                  AND (created_at, id) > ($2, $3)
                ORDER BY created_at ASC, id ASC
                LIMIT $4
                "#,
            )
            .bind(session_id)
            .bind(cursor_ts)
            .bind(cursor_id)
            .bind(limit)
            .fetch_all(pool)
            .await?,
            false,
        ),
    };

    let has_more = fetched.len() == limit as usize;
    let next_cursor = fetched
        .last()
        .map(|m| PageCursor::new(m.created_at, m.id));

    let mut rows = fetched;
    if descending {
        rows.reverse();
    }

    Ok(Page {
        rows,
        next_cursor,
        has_more,
    })
}

/// Insert an outbound message and its audit entry in one transaction.
pub async fn send(
    pool: &PgPool,
    instance_id: &str,
    session_id: &str,
    direction: MessageDirection,
    content: &str,
    actor: &str,
) -> Result<Message, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (instance_id, session_id, direction, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, instance_id, session_id, direction, content, tool_meta, created_at
        "#,
    )
    .bind(instance_id)
    .bind(session_id)
    .bind(direction)
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        actor,
        "message.sent",
        "messages",
        &message.id.to_string(),
        serde_json::json!({
            "instance_id": instance_id,
            "session_id": session_id,
        }),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        session_id,
        instance_id,
        message_id = %message.id,
        "Message sent"
    );
    Ok(message)
}

fn parse_message_id(raw: &str) -> Result<Uuid, sqlx::Error> {
    raw.parse()
        .map_err(|e| sqlx::Error::Decode(format!("bad message cursor id: {}", e).into()))
}
