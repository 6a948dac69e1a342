//! Subscription registry
//!
//! One refcounted broadcast channel per logical scope. The registry is the
//! single place feeds are opened and torn down: subscribing to an
//! already-active scope shares its channel instead of opening a second one,
//! and dropping the last `Subscription` for a scope removes the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::event::ChangePayload;
use crate::scope::Scope;

const CHANNEL_CAPACITY: usize = 256;

struct Entry {
    tx: broadcast::Sender<ChangePayload>,
    subscribers: usize,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<Scope, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open (or share) the feed for a scope. At most one channel exists per
    /// scope; a second subscriber bumps the refcount on the existing one.
    pub fn subscribe(self: &Arc<Self>, scope: Scope) -> Subscription {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entry(scope.clone()).or_insert_with(|| Entry {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            subscribers: 0,
        });
        entry.subscribers += 1;
        Subscription {
            scope,
            rx: entry.tx.subscribe(),
            registry: Arc::clone(self),
        }
    }

    /// Route a payload to every scope it matches. Returns the number of
    /// scopes that received it. Scopes with no live receivers are skipped
    /// silently.
    pub fn publish(&self, payload: &ChangePayload) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut reached = 0;
        for (scope, entry) in inner.iter() {
            if scope.matches(payload) && entry.tx.send(payload.clone()).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    /// Publish a resync marker on every active scope (feed reconnected;
    /// subscribers should refetch their first page).
    pub fn publish_resync(&self) -> usize {
        let tables: Vec<String> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let mut tables: Vec<String> =
                inner.keys().map(|scope| scope.table.clone()).collect();
            tables.sort();
            tables.dedup();
            tables
        };
        tables
            .into_iter()
            .map(|table| self.publish(&ChangePayload::resync(table)))
            .sum()
    }

    pub fn active_scopes(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, scope: &Scope) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = inner.get_mut(scope) {
            entry.subscribers -= 1;
            if entry.subscribers == 0 {
                inner.remove(scope);
            }
        }
    }
}

/// Live handle on one scope's feed. Dropping it is the only teardown path.
pub struct Subscription {
    scope: Scope,
    rx: broadcast::Receiver<ChangePayload>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Next payload for this scope. `None` means the feed channel closed.
    /// Lagging (slow consumer overrun) is logged and skipped, not fatal.
    pub async fn recv(&mut self) -> Option<ChangePayload> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        scope = %self.scope,
                        missed,
                        "Subscription lagged behind the change feed; events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeOp;

    fn message_payload(session: &str) -> ChangePayload {
        ChangePayload {
            table: "messages".to_string(),
            op: ChangeOp::Insert,
            new: Some(serde_json::json!({"id": "m1", "session_id": session})),
            old: None,
        }
    }

    #[tokio::test]
    async fn test_subscribe_routes_matching_payloads() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe(Scope::filtered("messages", "session_id", "chat_abc"));

        let reached = registry.publish(&message_payload("chat_abc"));
        assert_eq!(reached, 1);

        let payload = sub.recv().await.unwrap();
        assert_eq!(payload.table, "messages");
    }

    #[tokio::test]
    async fn test_non_matching_payload_is_not_delivered() {
        let registry = SubscriptionRegistry::new();
        let _sub = registry.subscribe(Scope::filtered("messages", "session_id", "chat_abc"));

        let reached = registry.publish(&message_payload("chat_xyz"));
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_same_scope_shares_one_entry() {
        let registry = SubscriptionRegistry::new();
        let scope = Scope::table("leads");
        let _a = registry.subscribe(scope.clone());
        let _b = registry.subscribe(scope);
        assert_eq!(registry.active_scopes(), 1, "no duplicate feed per scope");
    }

    #[tokio::test]
    async fn test_drop_of_last_subscriber_removes_scope() {
        let registry = SubscriptionRegistry::new();
        let scope = Scope::table("leads");
        let a = registry.subscribe(scope.clone());
        let b = registry.subscribe(scope);
        drop(a);
        assert_eq!(registry.active_scopes(), 1);
        drop(b);
        assert_eq!(registry.active_scopes(), 0);
    }

    #[tokio::test]
    async fn test_publish_to_empty_registry_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.publish(&message_payload("chat_abc")), 0);
    }

    #[tokio::test]
    async fn test_resync_reaches_every_active_scope() {
        let registry = SubscriptionRegistry::new();
        let mut a = registry.subscribe(Scope::filtered("messages", "session_id", "chat_abc"));
        let mut b = registry.subscribe(Scope::table("leads"));

        let reached = registry.publish_resync();
        assert_eq!(reached, 2);
        assert!(a.recv().await.unwrap().is_resync());
        assert!(b.recv().await.unwrap().is_resync());
    }
}
