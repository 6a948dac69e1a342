//! Change-feed bridge — Postgres NOTIFY to the subscription registry
//!
//! Database triggers emit one NOTIFY per row mutation on a single channel,
//! with a JSON payload `{table, op, new, old}`. This loop LISTENs on that
//! channel, decodes each notification and fans it out through the registry.
//! A dropped connection is a warning, not a failure: the HTTP API keeps
//! serving (stale) reads, the loop reconnects after a delay, and on
//! recovery a resync marker goes out on every active scope so views refetch
//! their first page instead of assuming the feed was gap-free.

use std::sync::Arc;
use std::time::Duration;

use atrio_core::config::RealtimeConfig;
use atrio_sync::{ChangePayload, SubscriptionRegistry};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;

pub async fn run_feed_bridge(
    pool: PgPool,
    config: RealtimeConfig,
    registry: Arc<SubscriptionRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut connected_before = false;

    loop {
        match PgListener::connect_with(&pool).await {
            Ok(mut listener) => match listener.listen(&config.channel).await {
                Ok(()) => {
                    if connected_before {
                        let reached = registry.publish_resync();
                        tracing::info!(
                            channel = %config.channel,
                            scopes = reached,
                            "Change feed reconnected; resync published"
                        );
                    } else {
                        tracing::info!(channel = %config.channel, "Change feed listening");
                    }
                    connected_before = true;

                    loop {
                        tokio::select! {
                            notification = listener.recv() => match notification {
                                Ok(n) => handle_notification(n.payload(), &registry),
                                Err(e) => {
                                    tracing::warn!(
                                        error = %e,
                                        "Change feed dropped; reads continue stale until reconnect"
                                    );
                                    break;
                                }
                            },
                            _ = shutdown.recv() => {
                                tracing::info!("Change feed shutting down...");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(channel = %config.channel, error = %e, "LISTEN failed");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Change feed connection failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.reconnect_delay_seconds)) => {}
            _ = shutdown.recv() => {
                tracing::info!("Change feed shutting down...");
                return;
            }
        }
    }
}

/// Decode and route one notification. Malformed payloads are dropped with a
/// warning — one bad trigger must not take the bridge down.
pub fn handle_notification(raw: &str, registry: &SubscriptionRegistry) {
    match ChangePayload::decode(raw) {
        Ok(payload) => {
            let reached = registry.publish(&payload);
            tracing::debug!(
                table = %payload.table,
                op = ?payload.op,
                scopes = reached,
                "Change event routed"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, raw, "Dropping malformed change payload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrio_sync::Scope;

    #[tokio::test]
    async fn test_notification_reaches_matching_subscription() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe(Scope::filtered("messages", "session_id", "chat_abc"));

        handle_notification(
            r#"{"table":"messages","op":"INSERT","new":{"id":"m1","session_id":"chat_abc"}}"#,
            &registry,
        );

        let payload = sub.recv().await.expect("payload should be routed");
        assert_eq!(payload.table, "messages");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped_quietly() {
        let registry = SubscriptionRegistry::new();
        let _sub = registry.subscribe(Scope::table("messages"));
        // Must not panic or publish anything.
        handle_notification("{not json", &registry);
    }
}
