use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::protocol::RemoteEvent;
use crate::store::SyncStore;

/// Dispatches raw push payloads into the store.
///
/// Anything that does not parse into a known event is dropped with a
/// warning, never an error, so one bad payload cannot take the channel
/// down. Accepted events stamp `last_message_at` for the staleness display.
pub struct UpdateRouter {
    store: Arc<SyncStore>,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
}

impl UpdateRouter {
    pub fn new(store: Arc<SyncStore>) -> Self {
        Self {
            store,
            last_message_at: RwLock::new(None),
        }
    }

    pub fn on_message(&self, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "inlet::router", error = %err, "dropping malformed push payload");
                return;
            }
        };
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("<missing>")
            .to_string();
        let event: RemoteEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(err) => {
                warn!(target: "inlet::router", kind = %kind, error = %err, "dropping unrecognized push event");
                return;
            }
        };

        *self.last_message_at.write() = Some(Utc::now());
        debug!(target: "inlet::router", kind = %kind, id = event.resource_id(), "applying remote event");
        self.store.apply_remote_event(event);
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        *self.last_message_at.read()
    }
}
