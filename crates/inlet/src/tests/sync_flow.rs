use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use push_bus::{LocalBus, PushBus};

use crate::channel::local::LocalChannel;
use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::connection::ConnectionState;
use crate::model::{DeletedResource, ResourceDraft};
use crate::protocol::RemoteEvent;

use super::support::{
    FailingChannel, ScriptedBackend, event_json, init_tracing, record, wait_until,
};

const TOPIC: &str = "resources/payments";
const DEADLINE: Duration = Duration::from_secs(5);

fn publish(bus: &LocalBus, event: &RemoteEvent) {
    bus.publish(TOPIC, Bytes::from(event_json(event)))
        .expect("publish event");
}

fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_poll_interval(Duration::from_millis(30))
        .with_max_reconnect_attempts(1)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(20))
        .with_connect_timeout(Duration::from_millis(500))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_events_flow_into_the_store() {
    init_tracing();
    let bus = Arc::new(LocalBus::new());
    let backend = ScriptedBackend::new(vec![record("p1", "t0", "pending", 100)]);
    let client = SyncClient::new(
        fast_config(),
        backend.clone(),
        Arc::new(LocalChannel::new(bus.clone(), TOPIC)),
    );

    client.start().await;
    assert_eq!(client.collection().len(), 1);
    assert!(client.has_items());
    assert!(client.last_synced_at().is_some());

    assert!(
        wait_until(DEADLINE, || client.connection_state() == ConnectionState::Connected).await,
        "push channel should connect"
    );
    client.select("p1");

    publish(
        &bus,
        &RemoteEvent::ResourceUpdated {
            payload: record("p1", "t1", "completed", 100),
        },
    );
    assert!(
        wait_until(DEADLINE, || {
            client.collection().first().map(|r| r.status.as_str()) == Some("completed")
        })
        .await,
        "update should reach the store"
    );
    assert_eq!(client.collection().len(), 1);
    assert_eq!(
        client.selection().expect("selection survives update").status,
        "completed"
    );
    assert!(client.last_message_at().is_some());

    publish(
        &bus,
        &RemoteEvent::ResourceDeleted {
            payload: DeletedResource { id: "p1".into() },
        },
    );
    assert!(
        wait_until(DEADLINE, || !client.has_items()).await,
        "delete should reach the store"
    );
    assert!(client.selection().is_none());

    client.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn falls_back_to_polling_when_push_cannot_connect() {
    init_tracing();
    let backend = ScriptedBackend::new(Vec::new());
    let client = SyncClient::new(fast_config(), backend.clone(), Arc::new(FailingChannel));

    client.start().await;
    assert!(!client.auto_refresh_enabled());

    assert!(
        wait_until(DEADLINE, || client.auto_refresh_enabled()).await,
        "exhausted retries should arm the poll scheduler"
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // Polling now carries changes on its own.
    backend.set_collection(vec![record("p9", "t5", "pending", 900)]);
    assert!(
        wait_until(DEADLINE, || client.has_items()).await,
        "poll ticks should pick up server changes"
    );
    assert_eq!(client.collection()[0].id, "p9");

    client.shutdown();
    assert!(!client.auto_refresh_enabled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn own_mutations_merge_once_despite_confirmation_events() {
    init_tracing();
    let bus = Arc::new(LocalBus::new());
    let backend = ScriptedBackend::new(Vec::new());
    let client = SyncClient::new(
        fast_config(),
        backend.clone(),
        Arc::new(LocalChannel::new(bus.clone(), TOPIC)),
    );

    client.start().await;
    assert!(
        wait_until(DEADLINE, || client.connection_state() == ConnectionState::Connected).await
    );

    let created = client
        .create(ResourceDraft::new("pending", 500))
        .await
        .expect("create succeeds");
    assert_eq!(client.collection().len(), 1);

    // The server's own confirmation arrives after our optimistic merge,
    // followed by a genuine update. Per-channel ordering means that once the
    // update is visible, the duplicate create has been processed too.
    publish(
        &bus,
        &RemoteEvent::ResourceCreated {
            payload: created.clone(),
        },
    );
    let mut flagged = created.clone();
    flagged.status = "flagged".into();
    flagged.updated_at = "t1".into();
    publish(
        &bus,
        &RemoteEvent::ResourceUpdated {
            payload: flagged.clone(),
        },
    );
    assert!(
        wait_until(DEADLINE, || {
            client.collection().first().map(|r| r.status.as_str()) == Some("flagged")
        })
        .await
    );
    assert_eq!(client.collection().len(), 1, "confirmation must not duplicate");

    client.delete(&created.id).await.expect("delete succeeds");
    assert!(!client.has_items());
    publish(
        &bus,
        &RemoteEvent::ResourceDeleted {
            payload: DeletedResource {
                id: created.id.clone(),
            },
        },
    );
    publish(
        &bus,
        &RemoteEvent::ResourceCreated {
            payload: record("p2", "t2", "pending", 70),
        },
    );
    assert!(
        wait_until(DEADLINE, || {
            client.collection().first().map(|r| r.id.as_str()) == Some("p2")
        })
        .await
    );
    assert_eq!(client.collection().len(), 1, "double delete must not resurrect or throw");

    client.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_refresh_propagates_failures_and_recovers() {
    init_tracing();
    let bus = Arc::new(LocalBus::new());
    let backend = ScriptedBackend::new(vec![record("p1", "t0", "pending", 100)]);
    let client = SyncClient::new(
        fast_config(),
        backend.clone(),
        Arc::new(LocalChannel::new(bus, TOPIC)),
    );

    client.start().await;
    assert_eq!(client.collection().len(), 1);
    assert!(client.last_sync_error().is_none());

    backend.fail_fetches(true);
    assert!(client.refresh().await.is_err());
    // Failure is banner-level: the collection keeps what it had.
    assert_eq!(client.collection().len(), 1);
    assert!(client.last_sync_error().is_some());

    backend.fail_fetches(false);
    backend.set_collection(vec![
        record("p1", "t0", "pending", 100),
        record("p2", "t1", "pending", 200),
    ]);
    client.refresh().await.expect("refresh recovers");
    assert_eq!(client.collection().len(), 2);
    assert!(client.last_sync_error().is_none());

    // Edit submissions follow the same confirm-then-merge path as creates.
    let mut edited = client.collection()[1].clone();
    edited.status = "completed".into();
    edited.updated_at = "t2".into();
    let confirmed = client.update(edited).await.expect("update succeeds");
    assert_eq!(confirmed.status, "completed");
    assert_eq!(client.collection()[1].status, "completed");

    client.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn auto_refresh_toggle_and_shutdown_are_idempotent() {
    init_tracing();
    let bus = Arc::new(LocalBus::new());
    let backend = ScriptedBackend::new(Vec::new());
    let client = SyncClient::new(
        fast_config(),
        backend.clone(),
        Arc::new(LocalChannel::new(bus, TOPIC)),
    );

    client.start().await;
    client.set_auto_refresh(true);
    client.set_auto_refresh(true);
    assert!(client.auto_refresh_enabled());

    let initial = backend.fetch_count();
    assert!(
        wait_until(DEADLINE, || backend.fetch_count() > initial).await,
        "auto refresh should fetch in the background"
    );

    client.set_auto_refresh(false);
    assert!(!client.auto_refresh_enabled());

    client.shutdown();
    client.shutdown();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // No background work survives teardown.
    let after = backend.fetch_count();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(backend.fetch_count(), after);
}
