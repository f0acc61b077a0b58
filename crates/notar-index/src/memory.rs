use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

use notar_types::Digest;
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::record::CertificateRecord;
use crate::traits::{sort_by_issue_time, CertificateIndex};

/// In-memory, HashMap-based certificate index.
///
/// Records live behind a `RwLock`; lookups share the lock and inserts take
/// it exclusively, so the presence check and the insert are one step.
pub struct InMemoryCertificateIndex {
    records: RwLock<HashMap<Digest, CertificateRecord>>,
}

impl InMemoryCertificateIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCertificateIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateIndex for InMemoryCertificateIndex {
    fn insert(&self, record: CertificateRecord) -> IndexResult<()> {
        let mut map = self.records.write().map_err(|_| IndexError::LockPoisoned)?;
        match map.entry(record.digest) {
            Entry::Occupied(_) => Err(IndexError::DuplicateDigest {
                digest: record.digest,
            }),
            Entry::Vacant(slot) => {
                debug!(digest = %record.digest, owner = %record.owner, "record indexed");
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn lookup(&self, digest: &Digest) -> IndexResult<Option<CertificateRecord>> {
        let map = self.records.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(map.get(digest).cloned())
    }

    fn list(&self) -> IndexResult<Vec<CertificateRecord>> {
        let map = self.records.read().map_err(|_| IndexError::LockPoisoned)?;
        let mut records: Vec<_> = map.values().cloned().collect();
        sort_by_issue_time(&mut records);
        Ok(records)
    }

    fn len(&self) -> IndexResult<usize> {
        let map = self.records.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(map.len())
    }
}
