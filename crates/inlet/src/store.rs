use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fingerprint::{FingerprintTracker, compute_fingerprint};
use crate::model::ResourceRecord;
use crate::protocol::RemoteEvent;

/// The authoritative in-memory collection and its selection.
///
/// Single writer: every update channel funnels through the mutation methods
/// here, which take the write lock for the whole merge. Every entry point is
/// synchronous and total: none can leave the collection with duplicate ids
/// or a selection pointing at a removed id.
///
/// Readers get the collection as an `Arc` that is only swapped when the
/// content actually changed, so a no-op snapshot replace preserves the
/// reference consumers already hold.
pub struct SyncStore {
    inner: RwLock<StoreInner>,
    revision_tx: watch::Sender<u64>,
}

struct StoreInner {
    collection: Arc<Vec<ResourceRecord>>,
    selection: Option<String>,
    tracker: FingerprintTracker,
    last_synced_at: Option<DateTime<Utc>>,
    revision: u64,
}

impl SyncStore {
    pub fn new() -> Self {
        let mut tracker = FingerprintTracker::new();
        tracker.commit(compute_fingerprint(&[]));
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(StoreInner {
                collection: Arc::new(Vec::new()),
                selection: None,
                tracker,
                last_synced_at: None,
                revision: 0,
            }),
            revision_tx,
        }
    }

    /// Apply a full re-fetch result (manual refresh or poll tick).
    ///
    /// A snapshot whose fingerprint matches the current collection performs
    /// no mutation at all; only `last_synced_at` is stamped, since the fetch
    /// still confirmed server state.
    pub fn replace_snapshot(&self, records: Vec<ResourceRecord>) {
        let records = dedup_by_id(records);
        let mut inner = self.inner.write();
        inner.last_synced_at = Some(Utc::now());

        let fingerprint = compute_fingerprint(&records);
        if !inner.tracker.has_changed(fingerprint) {
            debug!(target: "inlet::store", "snapshot unchanged, keeping collection as-is");
            return;
        }

        inner.tracker.commit(fingerprint);
        inner.collection = Arc::new(records);
        if let Some(selected) = inner.selection.clone() {
            if !inner.collection.iter().any(|r| r.id == selected) {
                debug!(target: "inlet::store", id = %selected, "selected entity left the snapshot, clearing selection");
                inner.selection = None;
            }
        }
        self.bump(&mut inner);
    }

    /// Apply a push-delivered delta. Consumes the event; re-delivery of the
    /// same event is a no-op.
    pub fn apply_remote_event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::ResourceCreated { payload } => self.merge_created(payload),
            RemoteEvent::ResourceUpdated { payload } => self.merge_updated(payload),
            RemoteEvent::ResourceDeleted { payload } => self.merge_deleted(&payload.id),
        }
    }

    /// Merge a locally created resource after the server confirmed it.
    /// Identical merge rules to the remote path, so the confirmation event
    /// that follows is idempotent.
    pub fn apply_optimistic_create(&self, record: ResourceRecord) {
        self.merge_created(record);
    }

    pub fn apply_optimistic_update(&self, record: ResourceRecord) {
        self.merge_updated(record);
    }

    pub fn apply_optimistic_delete(&self, id: &str) {
        self.merge_deleted(id);
    }

    /// Mark an entity as focused for the detail panel. Selecting an id that
    /// is not in the collection is reported and ignored, never an error.
    pub fn select(&self, id: &str) {
        let mut inner = self.inner.write();
        if !inner.collection.iter().any(|r| r.id == id) {
            warn!(target: "inlet::store", id, "select for an entity not in the collection, ignoring");
            return;
        }
        if inner.selection.as_deref() == Some(id) {
            return;
        }
        inner.selection = Some(id.to_string());
        self.bump(&mut inner);
    }

    pub fn clear_selection(&self) {
        let mut inner = self.inner.write();
        if inner.selection.take().is_some() {
            self.bump(&mut inner);
        }
    }

    fn merge_created(&self, record: ResourceRecord) {
        let mut inner = self.inner.write();
        if inner.collection.iter().any(|r| r.id == record.id) {
            debug!(target: "inlet::store", id = %record.id, "create for an existing id, dropping duplicate");
            return;
        }
        let mut next = inner.collection.as_ref().clone();
        // Newest-first presentation order.
        next.insert(0, record);
        self.install(&mut inner, next);
    }

    fn merge_updated(&self, record: ResourceRecord) {
        let mut inner = self.inner.write();
        let Some(position) = inner.collection.iter().position(|r| r.id == record.id) else {
            debug!(target: "inlet::store", id = %record.id, "update for an unknown id, dropping");
            return;
        };
        if inner.collection[position] == record {
            return;
        }
        let mut next = inner.collection.as_ref().clone();
        next[position] = record;
        self.install(&mut inner, next);
    }

    fn merge_deleted(&self, id: &str) {
        let mut inner = self.inner.write();
        let before = inner.collection.len();
        let mut next = inner.collection.as_ref().clone();
        next.retain(|r| r.id != id);
        if next.len() == before {
            debug!(target: "inlet::store", id, "delete for an unknown id, dropping");
            return;
        }
        if inner.selection.as_deref() == Some(id) {
            inner.selection = None;
        }
        self.install(&mut inner, next);
    }

    /// Swap in a merged collection and keep the fingerprint in step, so a
    /// poll snapshot structurally identical to the post-delta state is
    /// detected as a no-op.
    fn install(&self, inner: &mut StoreInner, next: Vec<ResourceRecord>) {
        let fingerprint = compute_fingerprint(&next);
        inner.tracker.commit(fingerprint);
        inner.collection = Arc::new(next);
        self.bump(inner);
    }

    fn bump(&self, inner: &mut StoreInner) {
        inner.revision += 1;
        self.revision_tx.send_replace(inner.revision);
    }

    pub fn collection(&self) -> Arc<Vec<ResourceRecord>> {
        self.inner.read().collection.clone()
    }

    pub fn has_items(&self) -> bool {
        !self.inner.read().collection.is_empty()
    }

    pub fn selection(&self) -> Option<ResourceRecord> {
        let inner = self.inner.read();
        let selected = inner.selection.as_deref()?;
        inner.collection.iter().find(|r| r.id == selected).cloned()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.inner.read().selection.clone()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_synced_at
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Revision watch for read-only subscribers; the value changes exactly
    /// when the observable state does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Server snapshots own the id uniqueness invariant; a misbehaving backend
/// must not be able to break it locally. First occurrence wins.
fn dedup_by_id(records: Vec<ResourceRecord>) -> Vec<ResourceRecord> {
    let mut seen = std::collections::HashSet::with_capacity(records.len());
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.id.clone()) {
            out.push(record);
        } else {
            warn!(target: "inlet::store", id = %record.id, "snapshot contained a duplicate id, keeping the first");
        }
    }
    out
}
