use std::sync::Arc;

use notar_types::Digest;

use crate::error::IndexResult;
use crate::record::CertificateRecord;

/// Digest-keyed store of certificate records.
///
/// Implementations must make insert-if-absent atomic: of any number of
/// concurrent inserts for one digest, exactly one succeeds.
pub trait CertificateIndex: Send + Sync {
    /// Store a new record. Fails with
    /// [`IndexError::DuplicateDigest`](crate::IndexError::DuplicateDigest)
    /// if the digest is already present; the existing record is untouched.
    fn insert(&self, record: CertificateRecord) -> IndexResult<()>;

    /// The record for a digest, if any.
    fn lookup(&self, digest: &Digest) -> IndexResult<Option<CertificateRecord>>;

    /// All records, oldest first.
    fn list(&self) -> IndexResult<Vec<CertificateRecord>>;

    /// Records issued to `owner`, oldest first.
    fn list_by_owner(&self, owner: &str) -> IndexResult<Vec<CertificateRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect())
    }

    fn len(&self) -> IndexResult<usize>;

    fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, digest: &Digest) -> IndexResult<bool> {
        Ok(self.lookup(digest)?.is_some())
    }
}

impl<T: CertificateIndex + ?Sized> CertificateIndex for Arc<T> {
    fn insert(&self, record: CertificateRecord) -> IndexResult<()> {
        (**self).insert(record)
    }

    fn lookup(&self, digest: &Digest) -> IndexResult<Option<CertificateRecord>> {
        (**self).lookup(digest)
    }

    fn list(&self) -> IndexResult<Vec<CertificateRecord>> {
        (**self).list()
    }

    fn list_by_owner(&self, owner: &str) -> IndexResult<Vec<CertificateRecord>> {
        (**self).list_by_owner(owner)
    }

    fn len(&self) -> IndexResult<usize> {
        (**self).len()
    }
}

/// Sort records oldest first, ties broken by id.
pub(crate) fn sort_by_issue_time(records: &mut [CertificateRecord]) {
    records.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
}
