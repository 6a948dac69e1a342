//! Keyset pagination
//!
//! Cursors are `(timestamp, id)` pairs rather than page offsets, so rows
//! inserted ahead of the cursor never shift or duplicate already-seen rows.
//! The id component is carried as a string: lists are keyed by uuid
//! (messages, leads) or by plain string (sessions, listings), and the query
//! layer binds it back to the column's real type. `has_more` uses the
//! full-page heuristic: a page of exactly `page_size` rows implies more may
//! exist; a partial page is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub ts: DateTime<Utc>,
    pub id: String,
}

impl PageCursor {
    pub fn new(ts: DateTime<Utc>, id: impl ToString) -> Self {
        Self {
            ts,
            id: id.to_string(),
        }
    }
}

/// `Forward` continues in the list's presentation order; `Backward` loads
/// older history (scroll-up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub next_cursor: Option<PageCursor>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page from rows in fetch order. `key` extracts the `(ts, id)`
    /// pair of a row; the last row's pair becomes the next cursor.
    pub fn from_rows(
        rows: Vec<T>,
        page_size: usize,
        key: impl Fn(&T) -> PageCursor,
    ) -> Self {
        let has_more = page_size > 0 && rows.len() == page_size;
        let next_cursor = rows.last().map(key);
        Self {
            rows,
            next_cursor,
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(n: i64) -> (DateTime<Utc>, String) {
        (
            Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
            format!("row-{}", n),
        )
    }

    #[test]
    fn test_full_page_implies_has_more() {
        let rows = vec![row(3), row(2), row(1)];
        let page = Page::from_rows(rows, 3, |r| PageCursor::new(r.0, &r.1));
        assert!(page.has_more);
        assert!(page.next_cursor.is_some());
    }

    #[test]
    fn test_partial_page_is_terminal() {
        let rows = vec![row(2), row(1)];
        let page = Page::from_rows(rows, 3, |r| PageCursor::new(r.0, &r.1));
        assert!(!page.has_more);
    }

    #[test]
    fn test_empty_page_has_no_cursor() {
        let page = Page::from_rows(Vec::<(DateTime<Utc>, String)>::new(), 3, |r| {
            PageCursor::new(r.0, &r.1)
        });
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_next_cursor_is_last_row() {
        let rows = vec![row(3), row(2), row(1)];
        let page = Page::from_rows(rows.clone(), 3, |r| PageCursor::new(r.0, &r.1));
        let cursor = page.next_cursor.unwrap();
        assert_eq!(cursor.ts, rows[2].0);
        assert_eq!(cursor.id, "row-1");
    }

    #[test]
    fn test_cursor_survives_query_string_round_trip() {
        let cursor = PageCursor::new(
            Utc.timestamp_opt(1_700_000_123, 0).unwrap(),
            "chat_abc",
        );
        let encoded = serde_json::to_string(&cursor).unwrap();
        let decoded: PageCursor = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, cursor);
    }
}
