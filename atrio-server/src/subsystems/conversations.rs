//! Conversation inbox — sessions derived by grouping messages
//!
//! There is no conversations table: the inbox list is computed from the
//! messages table (latest row + count per session), restricted to the
//! instances the caller may see, ordered most-recent-first with keyset
//! pagination on `(last_activity_at, session_id)`. Realtime message events
//! are folded into an already-fetched list by `apply_message_event`.

use atrio_core::models::{ConversationSummary, Message, Principal};
use atrio_sync::{ChangeEvent, LiveList, Page, PageCursor};
use sqlx::PgPool;

/// Default page size for the inbox.
const DEFAULT_LIMIT: i64 = 20;

/// Hard ceiling on page size.
const MAX_LIMIT: i64 = 100;

pub fn clamp_limit(limit: Option<u32>) -> i64 {
    limit
        .map(|l| (l as i64).clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}

/// Conversations visible to the caller, most recent activity first.
///
/// Visibility lives here, in one place, rather than scattered over call
/// sites: agents only see sessions on instances they own.
pub async fn list(
    pool: &PgPool,
    principal: &Principal,
    instance_id: Option<&str>,
    search: Option<&str>,
    cursor: Option<&PageCursor>,
    limit: Option<u32>,
) -> Result<Page<ConversationSummary>, sqlx::Error> {
    let limit = clamp_limit(limit);

    let rows = sqlx::query_as::<_, ConversationSummary>(
        r#"
        WITH grouped AS (
            SELECT session_id,
                   max(created_at) AS last_activity_at,
                   count(*)        AS message_count
            FROM messages
            GROUP BY session_id
        )
        SELECT g.session_id,
               last.instance_id,
               last.content AS last_message,
               g.last_activity_at,
               g.message_count
        FROM grouped g
        JOIN LATERAL (
            SELECT instance_id, content
            FROM messages
            WHERE session_id = g.session_id
            ORDER BY created_at DESC, id DESC
            LIMIT 1
        ) last ON true
        WHERE ($1::text IS NULL OR last.instance_id = $1)
          AND ($2::text IS NULL OR g.session_id ILIKE '%' || $2 || '%'
                                OR last.content ILIKE '%' || $2 || '%')
          AND ($3::boolean
               OR last.instance_id IN (SELECT id FROM instances WHERE owner_agent = $4))
          AND ($5::timestamptz IS NULL
               OR (g.last_activity_at, g.session_id) < ($5, $6))
        ORDER BY g.last_activity_at DESC, g.session_id DESC
        LIMIT $7
        "#,
    )
    .bind(instance_id)
    .bind(search)
    .bind(principal.sees_all())
    .bind(&principal.actor)
    .bind(cursor.map(|c| c.ts))
    .bind(cursor.map(|c| c.id.as_str()).unwrap_or(""))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(Page::from_rows(rows, limit as usize, |c| {
        PageCursor::new(c.last_activity_at, &c.session_id)
    }))
}

/// Fold one realtime message event into a conversation list.
///
/// A message insert either bumps its session's summary (count, preview,
/// activity) or creates a fresh one-message summary for a session the list
/// has not seen. Updates refresh the preview only when they touch the
/// latest message; deletes decrement the count but keep the stale preview —
/// it self-corrects on the next insert or refetch.
pub fn apply_message_event(
    list: &mut LiveList<ConversationSummary>,
    event: &ChangeEvent<Message>,
) -> bool {
    match event {
        ChangeEvent::Insert { new } => {
            let summary = match find(list, &new.session_id) {
                Some(existing) => ConversationSummary {
                    message_count: existing.message_count + 1,
                    last_message: new.content.clone(),
                    last_activity_at: new.created_at.max(existing.last_activity_at),
                    ..existing
                },
                None => summary_from(new, 1),
            };
            list.apply(ChangeEvent::Update {
                new: summary,
                old: None,
            })
        }
        ChangeEvent::Update { new, .. } => match find(list, &new.session_id) {
            Some(existing) if existing.last_activity_at <= new.created_at => {
                list.apply(ChangeEvent::Update {
                    new: ConversationSummary {
                        last_message: new.content.clone(),
                        ..existing
                    },
                    old: None,
                })
            }
            Some(_) => false,
            None => list.apply(ChangeEvent::Insert {
                new: summary_from(new, 1),
            }),
        },
        ChangeEvent::Delete { old } => match find(list, &old.session_id) {
            Some(existing) if existing.message_count <= 1 => list.apply(ChangeEvent::Delete {
                old: existing,
            }),
            Some(existing) => list.apply(ChangeEvent::Update {
                new: ConversationSummary {
                    message_count: existing.message_count - 1,
                    ..existing
                },
                old: None,
            }),
            None => false,
        },
    }
}

fn find(list: &LiveList<ConversationSummary>, session_id: &str) -> Option<ConversationSummary> {
    list.rows()
        .iter()
        .find(|c| c.session_id == session_id)
        .cloned()
}

fn summary_from(message: &Message, count: i64) -> ConversationSummary {
    ConversationSummary {
        session_id: message.session_id.clone(),
        instance_id: message.instance_id.clone(),
        last_message: message.content.clone(),
        last_activity_at: message.created_at,
        message_count: count,
    }
}
