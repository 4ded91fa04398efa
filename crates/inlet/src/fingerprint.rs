//! Cheap structural change detection over collection snapshots.

use crate::model::ResourceRecord;

/// Digest over the identity-relevant fields of an ordered collection.
///
/// The empty collection gets its own variant, distinct from every possible
/// digest, so a transition from N items to zero is always detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingerprint {
    Empty,
    Digest(u32),
}

// Field and record separators keep ("ab", "c") and ("a", "bc") from
// colliding.
const FIELD_SEP: &[u8] = &[0x1f];
const RECORD_SEP: &[u8] = &[0x1e];

/// Pure function over `{id, updated_at, status, amount}` per record,
/// order-sensitive. Fields outside that set do not participate: two
/// collections that agree on it are treated as identical for re-render
/// purposes.
pub fn compute_fingerprint(records: &[ResourceRecord]) -> Fingerprint {
    if records.is_empty() {
        return Fingerprint::Empty;
    }
    let mut crc = 0u32;
    for record in records {
        crc = crc32c::crc32c_append(crc, record.id.as_bytes());
        crc = crc32c::crc32c_append(crc, FIELD_SEP);
        crc = crc32c::crc32c_append(crc, record.updated_at.as_bytes());
        crc = crc32c::crc32c_append(crc, FIELD_SEP);
        crc = crc32c::crc32c_append(crc, record.status.as_bytes());
        crc = crc32c::crc32c_append(crc, FIELD_SEP);
        crc = crc32c::crc32c_append(crc, &record.amount.to_le_bytes());
        crc = crc32c::crc32c_append(crc, RECORD_SEP);
    }
    Fingerprint::Digest(crc)
}

/// Last committed fingerprint, with change detection split from commit:
/// `has_changed` never stores, so interleaved probes cannot double-count a
/// transition.
#[derive(Debug, Default)]
pub struct FingerprintTracker {
    committed: Option<Fingerprint>,
}

impl FingerprintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `candidate` differs from the committed value (or nothing
    /// has been committed yet).
    pub fn has_changed(&self, candidate: Fingerprint) -> bool {
        self.committed != Some(candidate)
    }

    pub fn commit(&mut self, candidate: Fingerprint) {
        self.committed = Some(candidate);
    }

    pub fn committed(&self) -> Option<Fingerprint> {
        self.committed
    }
}
