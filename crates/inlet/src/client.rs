use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{BackendError, ResourceBackend};
use crate::channel::PushChannel;
use crate::config::SyncConfig;
use crate::connection::{ConnectionController, ConnectionEvent, ConnectionState};
use crate::model::{ResourceDraft, ResourceRecord};
use crate::poll::{PollScheduler, SilentFetch};
use crate::router::UpdateRouter;
use crate::store::SyncStore;

/// Per-view synchronization facade.
///
/// Owns the store, the push connection, the poll scheduler, and the pump
/// task tying them together. Construct one per mounted view with its own
/// config and collaborators, and call [`SyncClient::shutdown`] on unmount:
/// sockets and timers must not outlive the view that created them.
pub struct SyncClient {
    config: SyncConfig,
    store: Arc<SyncStore>,
    backend: Arc<dyn ResourceBackend>,
    router: Arc<UpdateRouter>,
    controller: Arc<ConnectionController>,
    scheduler: Arc<PollScheduler>,
    last_sync_error: Arc<RwLock<Option<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SyncClient {
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn ResourceBackend>,
        channel: Arc<dyn PushChannel>,
    ) -> Self {
        let store = Arc::new(SyncStore::new());
        let router = Arc::new(UpdateRouter::new(store.clone()));
        let controller = Arc::new(ConnectionController::new(channel, &config));
        let last_sync_error = Arc::new(RwLock::new(None));

        let fetch: SilentFetch = {
            let backend = backend.clone();
            let store = store.clone();
            let last_sync_error = last_sync_error.clone();
            Arc::new(move || {
                let backend = backend.clone();
                let store = store.clone();
                let last_sync_error = last_sync_error.clone();
                Box::pin(async move {
                    silent_fetch(&*backend, &store, &last_sync_error).await;
                })
            })
        };
        let scheduler = Arc::new(PollScheduler::new(fetch));

        Self {
            config,
            store,
            backend,
            router,
            controller,
            scheduler,
            last_sync_error,
            pump: Mutex::new(None),
        }
    }

    /// Load the initial snapshot, bring up the push channel, and start
    /// pumping its events. An initial fetch failure is absorbed into
    /// [`SyncClient::last_sync_error`]; the view renders a banner and the
    /// next poll tick or manual refresh retries.
    pub async fn start(&self) {
        silent_fetch(&*self.backend, &self.store, &self.last_sync_error).await;
        // Subscribe the pump before the connect loop can emit anything.
        self.spawn_pump();
        self.controller.connect();
    }

    /// Manual refresh. Failures propagate to the caller; the collection is
    /// left untouched.
    pub async fn refresh(&self) -> Result<(), BackendError> {
        match self.backend.fetch_collection().await {
            Ok(records) => {
                self.store.replace_snapshot(records);
                *self.last_sync_error.write() = None;
                Ok(())
            }
            Err(err) => {
                *self.last_sync_error.write() = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Toggle timed background refresh. Polling runs alongside the push
    /// channel; the store's fingerprint gate keeps the overlap cheap.
    pub fn set_auto_refresh(&self, enabled: bool) {
        if enabled {
            self.scheduler.start(self.config.poll_interval);
        } else {
            self.scheduler.stop();
        }
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Submit a create. The merge happens only after the server confirms,
    /// so a failed submission leaves the collection untouched; the push
    /// confirmation that follows is idempotent against our own merge.
    pub async fn create(&self, draft: ResourceDraft) -> Result<ResourceRecord, BackendError> {
        let record = self.backend.create_resource(&draft).await?;
        self.store.apply_optimistic_create(record.clone());
        Ok(record)
    }

    pub async fn update(&self, record: ResourceRecord) -> Result<ResourceRecord, BackendError> {
        let updated = self.backend.update_resource(&record).await?;
        self.store.apply_optimistic_update(updated.clone());
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.backend.delete_resource(id).await?;
        self.store.apply_optimistic_delete(id);
        Ok(())
    }

    pub fn select(&self, id: &str) {
        self.store.select(id);
    }

    pub fn clear_selection(&self) {
        self.store.clear_selection();
    }

    pub fn collection(&self) -> Arc<Vec<ResourceRecord>> {
        self.store.collection()
    }

    pub fn selection(&self) -> Option<ResourceRecord> {
        self.store.selection()
    }

    pub fn has_items(&self) -> bool {
        self.store.has_items()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.store.last_synced_at()
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.router.last_message_at()
    }

    /// Most recent background sync failure, if the latest attempt failed.
    /// Banner-level: the collection keeps whatever it had.
    pub fn last_sync_error(&self) -> Option<String> {
        self.last_sync_error.read().clone()
    }

    /// Revision watch for read-only subscribers (the UI re-reads on change).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// Tear everything down: push connection, poll timer, event pump.
    /// Idempotent; required on view unmount.
    pub fn shutdown(&self) {
        self.controller.disconnect();
        self.scheduler.stop();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    fn spawn_pump(&self) {
        let mut guard = self.pump.lock();
        if guard.as_ref().is_some_and(|pump| !pump.is_finished()) {
            return;
        }

        let mut events = self.controller.subscribe();
        let router = self.router.clone();
        let scheduler = self.scheduler.clone();
        let poll_interval = self.config.poll_interval;

        *guard = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Message(raw)) => router.on_message(&raw),
                    Ok(ConnectionEvent::Connected { at }) => {
                        info!(target: "inlet::client", connected_at = %at, "push channel live");
                    }
                    Ok(ConnectionEvent::FallbackToPolling) => {
                        warn!(
                            target: "inlet::client",
                            interval_ms = poll_interval.as_millis() as u64,
                            "push channel gave up, polling takes over"
                        );
                        scheduler.start(poll_interval);
                    }
                    Ok(ConnectionEvent::StateChanged(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "inlet::client", skipped, "pump lagged behind connection events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

async fn silent_fetch(
    backend: &dyn ResourceBackend,
    store: &SyncStore,
    last_sync_error: &RwLock<Option<String>>,
) {
    match backend.fetch_collection().await {
        Ok(records) => {
            store.replace_snapshot(records);
            *last_sync_error.write() = None;
        }
        Err(err) => {
            warn!(target: "inlet::client", error = %err, "background refresh failed, keeping current collection");
            *last_sync_error.write() = Some(err.to_string());
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        // Controller and scheduler abort their own tasks on drop; the pump
        // is ours to stop.
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}
