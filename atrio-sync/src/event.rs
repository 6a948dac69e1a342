//! Change-feed events
//!
//! `ChangePayload` is the wire form of one change notification as emitted by
//! the database triggers: `{"table": ..., "op": "INSERT|UPDATE|DELETE",
//! "new": {...}, "old": {...}}`. `ChangeEvent<T>` is the typed form a view
//! works with after parsing the affected row into its model struct.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Operation kind of a change notification. The uppercase serde names match
/// Postgres `TG_OP`. `Resync` never comes from a trigger — the feed bridge
/// synthesizes it after a reconnect so views refetch instead of trusting a
/// gap-free feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
    Resync,
}

/// Wire form of one change-feed notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePayload {
    pub table: String,
    pub op: ChangeOp,
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed change payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{op:?} payload is missing its `{side}` row")]
    MissingRow { op: ChangeOp, side: &'static str },

    #[error("Resync markers carry no row")]
    NotARowEvent,
}

impl ChangePayload {
    pub fn decode(raw: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Synthesized marker telling subscribers of `table` to refetch.
    pub fn resync(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            op: ChangeOp::Resync,
            new: None,
            old: None,
        }
    }

    pub fn is_resync(&self) -> bool {
        self.op == ChangeOp::Resync
    }

    /// Parse the affected row(s) into a typed event.
    ///
    /// An `Update` whose `old` side fails to decode (e.g. the trigger only
    /// ships changed columns) degrades to `old: None` rather than erroring.
    pub fn row_event<T: DeserializeOwned>(&self) -> Result<ChangeEvent<T>, EventError> {
        match self.op {
            ChangeOp::Insert => {
                let new = self.require_row(self.new.as_ref(), "new")?;
                Ok(ChangeEvent::Insert { new })
            }
            ChangeOp::Update => {
                let new = self.require_row(self.new.as_ref(), "new")?;
                let old = self
                    .old
                    .as_ref()
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                Ok(ChangeEvent::Update { new, old })
            }
            ChangeOp::Delete => {
                let old = self.require_row(self.old.as_ref(), "old")?;
                Ok(ChangeEvent::Delete { old })
            }
            ChangeOp::Resync => Err(EventError::NotARowEvent),
        }
    }

    fn require_row<T: DeserializeOwned>(
        &self,
        row: Option<&serde_json::Value>,
        side: &'static str,
    ) -> Result<T, EventError> {
        let value = row.ok_or(EventError::MissingRow { op: self.op, side })?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Typed change event for one row model.
#[derive(Debug, Clone)]
pub enum ChangeEvent<T> {
    Insert { new: T },
    Update { new: T, old: Option<T> },
    Delete { old: T },
}

/// Implemented by every row model that flows through a live list.
pub trait KeyedRow {
    type Key: Eq + std::hash::Hash + Clone;

    /// Primary key used for dedupe and replacement.
    fn key(&self) -> Self::Key;

    /// Timestamp driving the list's sort order.
    fn activity_at(&self) -> DateTime<Utc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Row {
        id: String,
        body: String,
    }

    #[test]
    fn test_decode_insert_payload() {
        let raw = r#"{"table":"messages","op":"INSERT","new":{"id":"m1","body":"oi"}}"#;
        let payload = ChangePayload::decode(raw).unwrap();
        assert_eq!(payload.table, "messages");
        assert_eq!(payload.op, ChangeOp::Insert);

        let event: ChangeEvent<Row> = payload.row_event().unwrap();
        match event {
            ChangeEvent::Insert { new } => assert_eq!(new.id, "m1"),
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_update_with_undecodable_old_keeps_new() {
        let raw = r#"{"table":"messages","op":"UPDATE","new":{"id":"m1","body":"edited"},"old":{"body":"oi"}}"#;
        let payload = ChangePayload::decode(raw).unwrap();
        let event: ChangeEvent<Row> = payload.row_event().unwrap();
        match event {
            ChangeEvent::Update { new, old } => {
                assert_eq!(new.body, "edited");
                assert!(old.is_none(), "partial old row should degrade to None");
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_requires_old_row() {
        let raw = r#"{"table":"messages","op":"DELETE"}"#;
        let payload = ChangePayload::decode(raw).unwrap();
        let result: Result<ChangeEvent<Row>, _> = payload.row_event();
        assert!(matches!(
            result,
            Err(EventError::MissingRow { op: ChangeOp::Delete, side: "old" })
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error_not_a_panic() {
        assert!(ChangePayload::decode("{nope").is_err());
    }

    #[test]
    fn test_resync_marker_is_not_a_row_event() {
        let payload = ChangePayload::resync("messages");
        assert!(payload.is_resync());
        let result: Result<ChangeEvent<Row>, _> = payload.row_event();
        assert!(matches!(result, Err(EventError::NotARowEvent)));
    }
}
