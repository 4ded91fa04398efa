use serde::{Deserialize, Serialize};

use crate::model::{DeletedResource, ResourceRecord};

/// Inbound push-channel event.
///
/// Produced by the push channel, consumed exactly once by the router,
/// discarded after application. Every variant carries the full entity
/// payload (or the id for deletes), never a field-level patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    ResourceCreated { payload: ResourceRecord },
    ResourceUpdated { payload: ResourceRecord },
    ResourceDeleted { payload: DeletedResource },
}

impl RemoteEvent {
    /// Id of the entity this event is about.
    pub fn resource_id(&self) -> &str {
        match self {
            RemoteEvent::ResourceCreated { payload } => &payload.id,
            RemoteEvent::ResourceUpdated { payload } => &payload.id,
            RemoteEvent::ResourceDeleted { payload } => &payload.id,
        }
    }
}
