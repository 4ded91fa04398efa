use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single synchronized resource as the server hands it to us.
///
/// Only identity and the volatile fields are typed. Everything else the
/// server sends rides along in `extra` and is echoed back verbatim on update
/// submissions, so the engine never has to understand the full record shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRecord {
    pub id: String,
    /// Server-issued change token. Opaque to the engine: fingerprinted,
    /// never parsed or ordered locally.
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub status: String,
    /// Minor currency units.
    pub amount: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for a create submission; the server assigns `id` and `updatedAt`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDraft {
    pub status: String,
    pub amount: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceDraft {
    pub fn new(status: impl Into<String>, amount: i64) -> Self {
        Self {
            status: status.into(),
            amount,
            extra: Map::new(),
        }
    }
}

/// Body of a `resource_deleted` push event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedResource {
    pub id: String,
}
