use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Map;

use crate::backend::{BackendError, ResourceBackend};
use crate::channel::{PushChannel, PushSocket};
use crate::model::{ResourceDraft, ResourceRecord};
use crate::protocol::RemoteEvent;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn record(id: &str, updated_at: &str, status: &str, amount: i64) -> ResourceRecord {
    ResourceRecord {
        id: id.to_string(),
        updated_at: updated_at.to_string(),
        status: status.to_string(),
        amount,
        extra: Map::new(),
    }
}

pub fn event_json(event: &RemoteEvent) -> String {
    serde_json::to_string(event).expect("serialize event")
}

/// Poll `probe` every few milliseconds until it holds or `deadline` passes.
pub async fn wait_until(deadline: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    loop {
        if probe() {
            return true;
        }
        if started.elapsed() >= deadline {
            return probe();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// In-memory stand-in for the HTTP collaborator. Serves a mutable
/// collection, mints server-side ids for creates, and can be told to fail
/// fetches.
pub struct ScriptedBackend {
    collection: Mutex<Vec<ResourceRecord>>,
    fail_fetches: AtomicBool,
    fetches: AtomicUsize,
    next_id: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(records: Vec<ResourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            collection: Mutex::new(records),
            fail_fetches: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        })
    }

    pub fn set_collection(&self, records: Vec<ResourceRecord>) {
        *self.collection.lock() = records;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceBackend for ScriptedBackend {
    async fn fetch_collection(&self) -> Result<Vec<ResourceRecord>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(BackendError::InvalidResponse("scripted fetch failure".into()));
        }
        Ok(self.collection.lock().clone())
    }

    async fn create_resource(&self, draft: &ResourceDraft) -> Result<ResourceRecord, BackendError> {
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = ResourceRecord {
            id,
            updated_at: "t0".to_string(),
            status: draft.status.clone(),
            amount: draft.amount,
            extra: draft.extra.clone(),
        };
        self.collection.lock().insert(0, created.clone());
        Ok(created)
    }

    async fn update_resource(
        &self,
        record: &ResourceRecord,
    ) -> Result<ResourceRecord, BackendError> {
        let mut collection = self.collection.lock();
        if let Some(existing) = collection.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        }
        Ok(record.clone())
    }

    async fn delete_resource(&self, id: &str) -> Result<(), BackendError> {
        self.collection.lock().retain(|r| r.id != id);
        Ok(())
    }
}

/// A push channel that can never connect; forces the fallback path.
pub struct FailingChannel;

#[async_trait]
impl PushChannel for FailingChannel {
    async fn open(&self) -> Result<Box<dyn PushSocket>> {
        Err(anyhow!("push endpoint unreachable"))
    }
}
