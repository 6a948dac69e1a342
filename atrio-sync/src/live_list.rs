//! Optimistic list reconciliation
//!
//! A `LiveList` is the locally held, already-paginated slice of one scope.
//! `apply` merges a single realtime event without breaking the sort
//! invariant: inserts are idempotent by primary key, updates replace or —
//! when the row arrived outside the fetched page range — insert, deletes on
//! absent keys are a no-op. When the list carries a visibility predicate it
//! is re-applied after every merge, on top of whatever row security the
//! backend already enforces.

use crate::event::{ChangeEvent, KeyedRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Conversations, leads: latest activity first.
    MostRecentFirst,
    /// Messages within a session: oldest first.
    ChronologicalAsc,
}

type Visibility<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

pub struct LiveList<T: KeyedRow> {
    rows: Vec<T>,
    order: SortOrder,
    visibility: Option<Visibility<T>>,
}

impl<T: KeyedRow> LiveList<T> {
    pub fn new(order: SortOrder) -> Self {
        Self {
            rows: Vec::new(),
            order,
            visibility: None,
        }
    }

    /// A list restricted to rows the viewing principal may see. The
    /// predicate runs again after every merge.
    pub fn with_visibility(
        order: SortOrder,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            rows: Vec::new(),
            order,
            visibility: Some(Box::new(predicate)),
        }
    }

    /// Merge one realtime event. Returns whether the list changed.
    pub fn apply(&mut self, event: ChangeEvent<T>) -> bool {
        let mut changed = match event {
            ChangeEvent::Insert { new } => {
                if self.position(&new.key()).is_some() {
                    false
                } else {
                    self.rows.push(new);
                    true
                }
            }
            ChangeEvent::Update { new, old: _ } => {
                match self.position(&new.key()) {
                    Some(i) => self.rows[i] = new,
                    // Out of page range, but an update implies current
                    // relevance: insert instead of dropping.
                    None => self.rows.insert(0, new),
                }
                true
            }
            ChangeEvent::Delete { old } => match self.position(&old.key()) {
                Some(i) => {
                    self.rows.remove(i);
                    true
                }
                None => false,
            },
        };
        changed |= self.refilter();
        if changed {
            self.resort();
        }
        changed
    }

    /// Append a fetched page, deduplicating against rows realtime already
    /// delivered. Returns how many rows were added.
    pub fn extend_page(&mut self, page_rows: Vec<T>) -> usize {
        let mut added = 0;
        for row in page_rows {
            if self.position(&row.key()).is_none() {
                self.rows.push(row);
                added += 1;
            }
        }
        self.refilter();
        self.resort();
        added
    }

    /// Scope switch: drop everything.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        self.rows.iter().position(|r| r.key() == *key)
    }

    fn refilter(&mut self) -> bool {
        let Some(predicate) = &self.visibility else {
            return false;
        };
        let before = self.rows.len();
        self.rows.retain(|r| predicate(r));
        self.rows.len() != before
    }

    fn resort(&mut self) {
        match self.order {
            SortOrder::MostRecentFirst => self
                .rows
                .sort_by(|a, b| b.activity_at().cmp(&a.activity_at())),
            SortOrder::ChronologicalAsc => self
                .rows
                .sort_by(|a, b| a.activity_at().cmp(&b.activity_at())),
        }
    }
}
