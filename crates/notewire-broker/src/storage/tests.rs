//! Storage layer tests for the Notewire broker.

use notewire_core::db::unix_timestamp;

use super::db::Database;
use super::models::{delivery_status, KeyRole};

async fn test_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

// === Key tests ===

#[tokio::test]
async fn create_key_pair_links_halves() {
    let db = test_db().await;
    let (producer, subscriber) = db.create_key_pair(Some("alice@example.com")).await.unwrap();

    assert_eq!(producer.key_type, "producer");
    assert_eq!(subscriber.key_type, "subscriber");
    assert!(producer.key_value.starts_with("wh_"));
    assert!(subscriber.key_value.starts_with("ck_"));
    assert_eq!(producer.pair_id, producer.id);
    assert_eq!(subscriber.pair_id, producer.id);
    assert!(producer.active());
    assert!(subscriber.active());
}

#[tokio::test]
async fn key_values_are_unique_across_pairs() {
    let db = test_db().await;
    let (p1, s1) = db.create_key_pair(None).await.unwrap();
    let (p2, s2) = db.create_key_pair(None).await.unwrap();

    let values = [p1.key_value, s1.key_value, p2.key_value, s2.key_value];
    for (i, a) in values.iter().enumerate() {
        for b in values.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}

#[tokio::test]
async fn lookup_respects_role_discriminator() {
    let db = test_db().await;
    let (producer, subscriber) = db.create_key_pair(None).await.unwrap();

    // Right role resolves
    assert!(db
        .lookup_key(&producer.key_value, KeyRole::Producer)
        .await
        .unwrap()
        .is_some());

    // A subscriber key presented as a producer key does not
    assert!(db
        .lookup_key(&subscriber.key_value, KeyRole::Producer)
        .await
        .unwrap()
        .is_none());

    // Unknown key does not
    assert!(db
        .lookup_key("wh_nonexistent", KeyRole::Producer)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn pair_subscriber_resolves_live_half() {
    let db = test_db().await;
    let (producer, subscriber) = db.create_key_pair(None).await.unwrap();

    let resolved = db.pair_subscriber(&producer.id).await.unwrap().unwrap();
    assert_eq!(resolved.id, subscriber.id);

    assert!(db.pair_subscriber("no-such-id").await.unwrap().is_none());
}

#[tokio::test]
async fn deactivate_pair_flips_both_halves() {
    let db = test_db().await;
    let (producer, subscriber) = db
        .create_key_pair(Some("alice@example.com"))
        .await
        .unwrap();

    assert!(db
        .deactivate_pair(&producer.id, "alice@example.com")
        .await
        .unwrap());

    let producer = db.get_key(&producer.id).await.unwrap();
    let subscriber = db.get_key(&subscriber.id).await.unwrap();
    assert!(!producer.active());
    assert!(!subscriber.active());

    // Deactivated pair no longer resolves a live subscriber
    assert!(db.pair_subscriber(&producer.id).await.unwrap().is_none());
}

#[tokio::test]
async fn deactivate_pair_is_owner_scoped() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(Some("alice@example.com")).await.unwrap();

    // Another tenant cannot revoke the pair
    assert!(!db
        .deactivate_pair(&producer.id, "mallory@example.com")
        .await
        .unwrap());
    assert!(db.get_key(&producer.id).await.unwrap().active());
}

#[tokio::test]
async fn touch_key_updates_usage_stats() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();
    assert_eq!(producer.usage_count, 0);
    assert!(producer.last_used.is_none());

    db.touch_key(&producer.id).await.unwrap();
    db.touch_key(&producer.id).await.unwrap();

    let touched = db.get_key(&producer.id).await.unwrap();
    assert_eq!(touched.usage_count, 2);
    assert!(touched.last_used.is_some());
}

// === Event tests ===

#[tokio::test]
async fn insert_and_get_event() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    let event = db
        .insert_event(&producer.id, "inbox/a.md", b"payload", 3600)
        .await
        .unwrap();

    assert_eq!(event.producer_key_id, producer.id);
    assert_eq!(event.path, "inbox/a.md");
    assert_eq!(event.payload, b"payload");
    assert!(!event.is_processed());
    assert!(event.processed_at.is_none());
    assert_eq!(event.expires_at, event.created_at + 3600);

    let fetched = db.get_event(&event.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, event.id);
}

#[tokio::test]
async fn identical_payloads_get_distinct_ids() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    let a = db
        .insert_event(&producer.id, "x", b"same", 3600)
        .await
        .unwrap();
    let b = db
        .insert_event(&producer.id, "x", b"same", 3600)
        .await
        .unwrap();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn pending_events_in_insertion_order() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    let e1 = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();
    let e2 = db.insert_event(&producer.id, "b", b"2", 3600).await.unwrap();
    let e3 = db.insert_event(&producer.id, "c", b"3", 3600).await.unwrap();

    let pending = db.pending_events(&producer.id).await.unwrap();
    let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![e1.id.as_str(), e2.id.as_str(), e3.id.as_str()]);
}

#[tokio::test]
async fn pending_excludes_processed_and_foreign_events() {
    let db = test_db().await;
    let (producer_a, _) = db.create_key_pair(None).await.unwrap();
    let (producer_b, _) = db.create_key_pair(None).await.unwrap();

    let mine = db
        .insert_event(&producer_a.id, "a", b"1", 3600)
        .await
        .unwrap();
    let done = db
        .insert_event(&producer_a.id, "b", b"2", 3600)
        .await
        .unwrap();
    db.insert_event(&producer_b.id, "c", b"3", 3600)
        .await
        .unwrap();

    db.mark_event_processed(&done.id).await.unwrap();

    let pending = db.pending_events(&producer_a.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, mine.id);
}

#[tokio::test]
async fn mark_processed_is_idempotent() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();
    let event = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();

    assert!(db.mark_event_processed(&event.id).await.unwrap());
    let first = db.get_event(&event.id).await.unwrap().unwrap();
    assert!(first.is_processed());
    let first_at = first.processed_at.unwrap();

    // Second call succeeds without effect; the timestamp is untouched
    assert!(!db.mark_event_processed(&event.id).await.unwrap());
    let second = db.get_event(&event.id).await.unwrap().unwrap();
    assert_eq!(second.processed_at.unwrap(), first_at);
}

#[tokio::test]
async fn delete_single_event() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();
    let event = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();

    assert!(db.delete_event(&event.id).await.unwrap());
    assert!(db.get_event(&event.id).await.unwrap().is_none());

    // Deleting again reports nothing removed
    assert!(!db.delete_event(&event.id).await.unwrap());
}

#[tokio::test]
async fn delete_expired_ignores_processed_state() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    // Negative TTL: already expired at insert
    let expired_done = db.insert_event(&producer.id, "a", b"1", -10).await.unwrap();
    let expired_open = db.insert_event(&producer.id, "b", b"2", -10).await.unwrap();
    let live = db.insert_event(&producer.id, "c", b"3", 3600).await.unwrap();

    db.mark_event_processed(&expired_done.id).await.unwrap();

    let removed = db.delete_expired_events().await.unwrap();
    assert_eq!(removed, 2);

    assert!(db.get_event(&expired_done.id).await.unwrap().is_none());
    assert!(db.get_event(&expired_open.id).await.unwrap().is_none());
    assert!(db.get_event(&live.id).await.unwrap().is_some());
}

#[tokio::test]
async fn reap_cascades_to_delivery_logs() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    let event = db.insert_event(&producer.id, "a", b"1", -10).await.unwrap();
    db.open_delivery_log(&event.id, &producer.id, 200)
        .await
        .unwrap();
    assert!(db.get_delivery_log(&event.id).await.unwrap().is_some());

    db.delete_expired_events().await.unwrap();
    assert!(db.get_delivery_log(&event.id).await.unwrap().is_none());
}

// === Delivery log tests ===

#[tokio::test]
async fn delivery_log_advances_one_way() {
    let db = test_db().await;
    let (producer, subscriber) = db.create_key_pair(None).await.unwrap();
    let event = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();

    db.open_delivery_log(&event.id, &producer.id, 200)
        .await
        .unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.status, delivery_status::PENDING);
    assert!(log.delivered_at.is_none());
    assert!(log.subscriber_key_id.is_none());

    db.mark_log_delivered(&event.id, &subscriber.id)
        .await
        .unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.status, delivery_status::DELIVERED);
    assert_eq!(log.subscriber_key_id.as_deref(), Some(subscriber.id.as_str()));
    let delivered_at = log.delivered_at.unwrap();

    // A second delivery attempt (reconnect seed racing the broadcaster)
    // does not rewrite the row
    db.mark_log_delivered(&event.id, "someone-else").await.unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.subscriber_key_id.as_deref(), Some(subscriber.id.as_str()));
    assert_eq!(log.delivered_at.unwrap(), delivered_at);

    db.mark_log_acked(&event.id).await.unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.status, delivery_status::ACKED);
    let acked_at = log.acked_at.unwrap();

    // Acked is terminal: repeat acks and late deliveries are no-ops
    db.mark_log_acked(&event.id).await.unwrap();
    db.mark_log_delivered(&event.id, &subscriber.id)
        .await
        .unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.status, delivery_status::ACKED);
    assert_eq!(log.acked_at.unwrap(), acked_at);
}

#[tokio::test]
async fn ack_straight_from_pending() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();
    let event = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();
    db.open_delivery_log(&event.id, &producer.id, 200)
        .await
        .unwrap();

    // Pull consumers ack without a delivered transition
    db.mark_log_acked(&event.id).await.unwrap();
    let log = db.get_delivery_log(&event.id).await.unwrap().unwrap();
    assert_eq!(log.status, delivery_status::ACKED);
    assert!(log.delivered_at.is_none());
}

#[tokio::test]
async fn count_unacked_respects_threshold() {
    let db = test_db().await;
    let (producer, _) = db.create_key_pair(None).await.unwrap();

    let stale = db.insert_event(&producer.id, "a", b"1", 3600).await.unwrap();
    db.open_delivery_log(&stale.id, &producer.id, 200)
        .await
        .unwrap();
    // Age the row past the threshold
    sqlx::query("UPDATE delivery_logs SET attempted_at = ? WHERE event_id = ?")
        .bind(unix_timestamp() - 7200)
        .bind(&stale.id)
        .execute(db.pool())
        .await
        .unwrap();

    let fresh = db.insert_event(&producer.id, "b", b"2", 3600).await.unwrap();
    db.open_delivery_log(&fresh.id, &producer.id, 200)
        .await
        .unwrap();

    assert_eq!(db.count_unacked_logs(3600).await.unwrap(), 1);

    db.mark_log_acked(&stale.id).await.unwrap();
    assert_eq!(db.count_unacked_logs(3600).await.unwrap(), 0);
}
