//! End-to-end reconciliation scenarios over the in-process registry:
//! selecting an instance scope, folding realtime message events into the
//! conversations list, and discarding work that belongs to an abandoned
//! scope.

use atrio_core::models::{ConversationSummary, Message};
use atrio_server::subsystems::{conversations, feed};
use atrio_sync::{
    ChangeEvent, LiveList, Scope, ScopeGen, SortOrder, SubscriptionRegistry,
};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

fn message_payload(session: &str, instance: &str, content: &str) -> String {
    serde_json::json!({
        "table": "messages",
        "op": "INSERT",
        "new": {
            "id": Uuid::new_v4(),
            "instance_id": instance,
            "session_id": session,
            "direction": "human",
            "content": content,
            "tool_meta": null,
            "created_at": Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_instance_scope_builds_conversation_from_realtime_insert() {
    let registry = SubscriptionRegistry::new();

    // Operator selects instance "sdr-01": empty list, one live scope.
    let mut sub = registry.subscribe(Scope::filtered("messages", "instance_id", "sdr-01"));
    let mut list: LiveList<ConversationSummary> = LiveList::new(SortOrder::MostRecentFirst);
    assert!(list.is_empty());

    // A first message for session "chat_abc" arrives over the feed.
    feed::handle_notification(
        &message_payload("chat_abc", "sdr-01", "olá, vi o anúncio"),
        &registry,
    );

    let payload = sub.recv().await.expect("event must reach the scope");
    let event: ChangeEvent<Message> = payload.row_event().expect("typed row");
    conversations::apply_message_event(&mut list, &event);

    assert_eq!(list.len(), 1);
    let convo = &list.rows()[0];
    assert_eq!(convo.session_id, "chat_abc");
    assert_eq!(convo.message_count, 1);
}

#[tokio::test]
async fn test_event_for_another_instance_never_reaches_the_view() {
    let registry = SubscriptionRegistry::new();
    let _sub = registry.subscribe(Scope::filtered("messages", "instance_id", "sdr-01"));

    let reached = registry.publish(
        &atrio_sync::ChangePayload::decode(&message_payload("chat_xyz", "sdr-02", "oi")).unwrap(),
    );
    assert_eq!(reached, 0, "other instance's event matches no scope");
}

#[tokio::test]
async fn test_switching_scope_drops_the_old_subscription() {
    let registry = SubscriptionRegistry::new();

    let sub_a = registry.subscribe(Scope::filtered("messages", "instance_id", "sdr-01"));
    assert_eq!(registry.active_scopes(), 1);

    // Switching the selected instance closes the old feed before opening
    // the new one.
    drop(sub_a);
    let _sub_b = registry.subscribe(Scope::filtered("messages", "instance_id", "sdr-02"));
    assert_eq!(registry.active_scopes(), 1);

    // An event for the abandoned instance goes nowhere.
    let reached = registry.publish(
        &atrio_sync::ChangePayload::decode(&message_payload("chat_abc", "sdr-01", "oi")).unwrap(),
    );
    assert_eq!(reached, 0);
}

#[test]
fn test_stale_fetch_result_is_discarded_after_scope_switch() {
    let gen = ScopeGen::new();
    let mut list: LiveList<ConversationSummary> = LiveList::new(SortOrder::MostRecentFirst);

    // Scope A's fetch goes out...
    let fetch_gen = gen.begin();
    let fetched_for_a = vec![ConversationSummary {
        session_id: "chat_a".to_string(),
        instance_id: "sdr-01".to_string(),
        last_message: "oi".to_string(),
        last_activity_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        message_count: 3,
    }];

    // ...the operator switches to scope B before it resolves...
    let _current = gen.begin();
    list.reset();

    // ...and the late response must not be applied.
    if gen.is_current(fetch_gen) {
        list.extend_page(fetched_for_a);
    }
    assert!(list.is_empty(), "scope B's list must not show scope A's rows");
}

#[test]
fn test_restricted_agent_list_stays_clean_after_merges() {
    let mut list = LiveList::with_visibility(SortOrder::MostRecentFirst, |lead: &atrio_core::models::Lead| {
        lead.assigned_agent.as_deref() == Some("ana")
    });

    let lead = |agent: Option<&str>, n: i64| atrio_core::models::Lead {
        id: Uuid::new_v4(),
        name: "Maria".to_string(),
        phone: "11999990000".to_string(),
        email: None,
        stage: atrio_core::models::LeadStage::New,
        assigned_agent: agent.map(str::to_string),
        assigned_agent_name: None,
        estimated_value: None,
        notes: None,
        listing_id: None,
        created_at: Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
        updated_at: Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
    };

    list.apply(ChangeEvent::Insert { new: lead(Some("ana"), 1) });
    list.apply(ChangeEvent::Insert { new: lead(Some("rui"), 2) });
    list.apply(ChangeEvent::Insert { new: lead(None, 3) });

    assert_eq!(list.len(), 1);
    assert!(list
        .rows()
        .iter()
        .all(|l| l.assigned_agent.as_deref() == Some("ana")));

    // A reassignment away from ana removes the row on merge.
    let mine = list.rows()[0].clone();
    let mut moved = mine.clone();
    moved.assigned_agent = Some("rui".to_string());
    list.apply(ChangeEvent::Update {
        new: moved,
        old: Some(mine),
    });
    assert!(list.is_empty());
}
