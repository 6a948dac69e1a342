//! Subscription scopes and scope generations
//!
//! A `Scope` is the logical key of one live feed: a table plus an optional
//! single-column row filter ("messages where session_id = X"). `ScopeGen`
//! guards a view against stale work: every scope switch bumps the
//! generation, and results tagged with an older generation are discarded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::ChangePayload;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub table: String,
    pub filter: Option<(String, String)>,
}

impl Scope {
    /// Every row of a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            filter: None,
        }
    }

    /// Rows of a table where `column` equals `value`.
    pub fn filtered(
        name: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            table: name.into(),
            filter: Some((column.into(), value.into())),
        }
    }

    /// Whether a change payload belongs to this scope. Resync markers match
    /// every scope of their table. A filtered scope matches when either the
    /// new or the old row carries the filter value, so a row moving out of
    /// the filter still reaches the view that currently shows it.
    pub fn matches(&self, payload: &ChangePayload) -> bool {
        if self.table != payload.table {
            return false;
        }
        let Some((column, want)) = &self.filter else {
            return true;
        };
        if payload.is_resync() {
            return true;
        }
        field_eq(payload.new.as_ref(), column, want) || field_eq(payload.old.as_ref(), column, want)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some((column, value)) => write!(f, "{}[{}={}]", self.table, column, value),
            None => write!(f, "{}", self.table),
        }
    }
}

fn field_eq(row: Option<&serde_json::Value>, column: &str, want: &str) -> bool {
    let Some(field) = row.and_then(|r| r.get(column)) else {
        return false;
    };
    match field {
        serde_json::Value::String(s) => s == want,
        other => other.to_string() == want,
    }
}

/// Monotonic generation counter for one view's current scope.
#[derive(Debug, Default)]
pub struct ScopeGen(AtomicU64);

impl ScopeGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a new scope; everything tagged with an older generation is stale.
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, gen: u64) -> bool {
        self.current() == gen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeOp;

    fn payload(table: &str, session: &str) -> ChangePayload {
        ChangePayload {
            table: table.to_string(),
            op: ChangeOp::Insert,
            new: Some(serde_json::json!({"id": "m1", "session_id": session})),
            old: None,
        }
    }

    #[test]
    fn test_unfiltered_scope_matches_whole_table() {
        let scope = Scope::table("messages");
        assert!(scope.matches(&payload("messages", "chat_abc")));
        assert!(!scope.matches(&payload("leads", "chat_abc")));
    }

    #[test]
    fn test_filtered_scope_matches_on_column_value() {
        let scope = Scope::filtered("messages", "session_id", "chat_abc");
        assert!(scope.matches(&payload("messages", "chat_abc")));
        assert!(!scope.matches(&payload("messages", "chat_xyz")));
    }

    #[test]
    fn test_filtered_scope_matches_old_row_when_value_moves_away() {
        let scope = Scope::filtered("leads", "assigned_agent", "ana");
        let moved = ChangePayload {
            table: "leads".to_string(),
            op: ChangeOp::Update,
            new: Some(serde_json::json!({"id": "l1", "assigned_agent": "rui"})),
            old: Some(serde_json::json!({"id": "l1", "assigned_agent": "ana"})),
        };
        assert!(scope.matches(&moved), "old owner's view must see the row leave");
    }

    #[test]
    fn test_non_string_filter_values_compare_by_rendering() {
        let scope = Scope::filtered("leads", "estimated_value", "350000");
        let p = ChangePayload {
            table: "leads".to_string(),
            op: ChangeOp::Insert,
            new: Some(serde_json::json!({"estimated_value": 350000})),
            old: None,
        };
        assert!(scope.matches(&p));
    }

    #[test]
    fn test_resync_matches_filtered_scopes_of_its_table() {
        let scope = Scope::filtered("messages", "session_id", "chat_abc");
        assert!(scope.matches(&ChangePayload::resync("messages")));
        assert!(!scope.matches(&ChangePayload::resync("leads")));
    }

    #[test]
    fn test_scope_gen_invalidates_older_generations() {
        let gen = ScopeGen::new();
        let first = gen.begin();
        assert!(gen.is_current(first));
        let second = gen.begin();
        assert!(!gen.is_current(first));
        assert!(gen.is_current(second));
    }
}
