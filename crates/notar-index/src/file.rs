use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use notar_types::Digest;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::record::CertificateRecord;
use crate::traits::{sort_by_issue_time, CertificateIndex};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Crash-recoverable, append-only certificate index.
///
/// On-disk format, one frame per record:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized CertificateRecord)]
/// ```
///
/// Every insert is synced before it becomes visible. A failed append is
/// rolled back to the last committed length, and any bytes found past that
/// length are dropped before the next append.
///
/// On open the log is replayed front to back. Frames that fail the CRC, do
/// not decode, or carry an impossible length are skipped, and replay resumes
/// at the next intact frame. Only bytes after the last intact frame are
/// treated as a torn tail and cut off.
pub struct FileCertificateIndex {
    path: PathBuf,
    state: RwLock<FileState>,
    skipped_on_open: usize,
}

struct FileState {
    records: HashMap<Digest, CertificateRecord>,
    file: File,
    /// Log length covering every record in `records`.
    committed: u64,
}

/// Result of replaying a log image.
struct Replay {
    records: Vec<CertificateRecord>,
    /// End of the last intact frame.
    valid_len: u64,
    skipped: usize,
}

impl FileCertificateIndex {
    /// Open (or create) the log at `path` and rebuild the index from it.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let bytes = fs::read(path)?;
        let replay = replay(&bytes);

        if replay.valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                file_len = bytes.len(),
                "truncating torn tail of certificate log"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let mut skipped = replay.skipped;
        let mut records = HashMap::with_capacity(replay.records.len());
        for record in replay.records {
            if records.contains_key(&record.digest) {
                warn!(digest = %record.digest, "duplicate digest in certificate log; keeping first");
                skipped += 1;
                continue;
            }
            records.insert(record.digest, record);
        }

        info!(
            path = %path.display(),
            records = records.len(),
            skipped,
            "certificate index opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(FileState {
                records,
                file,
                committed: replay.valid_len,
            }),
            skipped_on_open: skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of log frames discarded while opening.
    pub fn skipped_on_open(&self) -> usize {
        self.skipped_on_open
    }
}

impl CertificateIndex for FileCertificateIndex {
    fn insert(&self, record: CertificateRecord) -> IndexResult<()> {
        let mut state = self.state.write().map_err(|_| IndexError::LockPoisoned)?;
        if state.records.contains_key(&record.digest) {
            return Err(IndexError::DuplicateDigest {
                digest: record.digest,
            });
        }

        let frame = encode_frame(&record)?;
        let on_disk = state.file.metadata()?.len();
        if on_disk != state.committed {
            warn!(
                on_disk,
                committed = state.committed,
                "discarding uncommitted bytes in certificate log"
            );
            state.file.set_len(state.committed)?;
        }

        if let Err(e) = append(&state.file, &frame) {
            if let Err(rollback) = state.file.set_len(state.committed) {
                warn!(error = %rollback, "failed to roll back partial append");
            }
            return Err(e.into());
        }

        state.committed += frame.len() as u64;
        debug!(digest = %record.digest, len = frame.len(), "record appended");
        state.records.insert(record.digest, record);
        Ok(())
    }

    fn lookup(&self, digest: &Digest) -> IndexResult<Option<CertificateRecord>> {
        let state = self.state.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(state.records.get(digest).cloned())
    }

    fn list(&self) -> IndexResult<Vec<CertificateRecord>> {
        let state = self.state.read().map_err(|_| IndexError::LockPoisoned)?;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        sort_by_issue_time(&mut records);
        Ok(records)
    }

    fn len(&self) -> IndexResult<usize> {
        let state = self.state.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(state.records.len())
    }
}

impl std::fmt::Debug for FileCertificateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCertificateIndex")
            .field("path", &self.path)
            .field("skipped_on_open", &self.skipped_on_open)
            .finish_non_exhaustive()
    }
}

fn encode_frame(record: &CertificateRecord) -> IndexResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| IndexError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| IndexError::Serialization("record exceeds frame size".into()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn append(mut file: &File, frame: &[u8]) -> io::Result<()> {
    file.write_all(frame)?;
    file.sync_all()
}

/// Payload length of the frame at `offset`, if its header fits the log.
fn frame_length(bytes: &[u8], offset: usize) -> Option<usize> {
    let header = bytes.get(offset..offset.checked_add(HEADER_SIZE)?)?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let end = offset + HEADER_SIZE + length;
    (length > 0 && end <= bytes.len()).then_some(length)
}

/// Payload length of the complete, CRC-matching frame at `offset`.
fn intact_frame_at(bytes: &[u8], offset: usize) -> Option<usize> {
    let length = frame_length(bytes, offset)?;
    let expected = u32::from_le_bytes([
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ]);
    let start = offset + HEADER_SIZE;
    (crc32fast::hash(&bytes[start..start + length]) == expected).then_some(length)
}

/// Offset of the first intact frame at or after `from`.
fn next_intact_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len().saturating_sub(HEADER_SIZE)).find(|&at| intact_frame_at(bytes, at).is_some())
}

fn replay(bytes: &[u8]) -> Replay {
    let mut records = Vec::new();
    let mut skipped = 0;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(length) = intact_frame_at(bytes, offset) else {
            if let Some(next) = next_intact_frame(bytes, offset + 1) {
                warn!(offset, resume_at = next, "damaged frame; resyncing");
                skipped += 1;
                offset = next;
                continue;
            }
            if let Some(length) = frame_length(bytes, offset) {
                warn!(offset, "CRC mismatch; skipping frame");
                skipped += 1;
                offset += HEADER_SIZE + length;
                continue;
            }
            // Nothing intact follows: torn tail.
            break;
        };

        let end = offset + HEADER_SIZE + length;
        match bincode::deserialize::<CertificateRecord>(&bytes[offset + HEADER_SIZE..end]) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(offset, error = %e, "undecodable frame; skipping");
                skipped += 1;
            }
        }
        offset = end;
    }

    Replay {
        records,
        valid_len: offset as u64,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use notar_types::TxSignature;
    use tempfile::TempDir;

    use super::*;

    fn digest(n: u8) -> Digest {
        Digest::from([n; 32])
    }

    fn record(n: u8, owner: &str) -> CertificateRecord {
        CertificateRecord::new(digest(n), owner).with_signature(TxSignature::from_bytes([n; 64]))
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");

        let r1 = record(1, "alice");
        let r2 = record(2, "bob").with_remarks("thesis");
        {
            let index = FileCertificateIndex::open(&path).unwrap();
            index.insert(r1.clone()).unwrap();
            index.insert(r2.clone()).unwrap();
        }

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.skipped_on_open(), 0);
        assert_eq!(index.lookup(&digest(1)).unwrap(), Some(r1));
        assert_eq!(index.lookup(&digest(2)).unwrap(), Some(r2));
    }

    #[test]
    fn duplicate_rejected_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        let original = record(1, "alice");
        FileCertificateIndex::open(&path)
            .unwrap()
            .insert(original.clone())
            .unwrap();

        let index = FileCertificateIndex::open(&path).unwrap();
        let err = index.insert(record(1, "mallory")).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDigest { .. }));
        assert_eq!(index.lookup(&digest(1)).unwrap(), Some(original));

        let len_before = fs::metadata(&path).unwrap().len();
        let _ = index.insert(record(1, "mallory"));
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn corrupt_frame_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        {
            let index = FileCertificateIndex::open(&path).unwrap();
            for n in 1..=3 {
                index.insert(record(n, "alice")).unwrap();
            }
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 1] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.skipped_on_open(), 1);
        assert_eq!(index.len().unwrap(), 2);
        assert!(index.lookup(&digest(1)).unwrap().is_none());
        assert!(index.lookup(&digest(3)).unwrap().is_some());
    }

    #[test]
    fn torn_tail_is_truncated_and_appends_resume() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        {
            let index = FileCertificateIndex::open(&path).unwrap();
            index.insert(record(1, "alice")).unwrap();
        }
        let clean_len = fs::metadata(&path).unwrap().len();

        // Header promising 100 bytes followed by only three.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        {
            let index = FileCertificateIndex::open(&path).unwrap();
            assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
            assert_eq!(index.len().unwrap(), 1);
            index.insert(record(2, "bob")).unwrap();
        }

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.skipped_on_open(), 0);
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        let index = FileCertificateIndex::open(&path).unwrap();
        index.insert(record(1, "alice")).unwrap();

        // A read-only handle makes the next append fail.
        index.state.write().unwrap().file = File::open(&path).unwrap();
        let err = index.insert(record(2, "bob")).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)), "{err:?}");
        assert!(index.lookup(&digest(2)).unwrap().is_none());

        index.state.write().unwrap().file =
            OpenOptions::new().read(true).append(true).open(&path).unwrap();
        index.insert(record(3, "carol")).unwrap();
        drop(index);

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.skipped_on_open(), 0);
        assert!(index.lookup(&digest(1)).unwrap().is_some());
        assert!(index.lookup(&digest(2)).unwrap().is_none());
        assert!(index.lookup(&digest(3)).unwrap().is_some());
    }

    #[test]
    fn partial_frame_from_failed_write_does_not_hide_later_inserts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        let index = FileCertificateIndex::open(&path).unwrap();
        index.insert(record(1, "alice")).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        // Leftover of an append that died midway.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(&[9; 7]).unwrap();
        drop(file);

        let r2 = record(2, "bob");
        index.insert(r2.clone()).unwrap();
        let expected_len = committed + encode_frame(&r2).unwrap().len() as u64;
        assert_eq!(fs::metadata(&path).unwrap().len(), expected_len);
        drop(index);

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.lookup(&digest(2)).unwrap(), Some(r2));
    }

    #[test]
    fn damaged_length_mid_log_keeps_later_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certs.log");
        {
            let index = FileCertificateIndex::open(&path).unwrap();
            for n in 1..=3 {
                index.insert(record(n, "alice")).unwrap();
            }
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = 0xFF;
        bytes[1] = 0xFF;
        fs::write(&path, &bytes).unwrap();

        {
            let index = FileCertificateIndex::open(&path).unwrap();
            assert_eq!(fs::metadata(&path).unwrap().len(), bytes.len() as u64);
            assert_eq!(index.skipped_on_open(), 1);
            assert_eq!(index.len().unwrap(), 2);
            assert!(index.lookup(&digest(1)).unwrap().is_none());
            assert!(index.lookup(&digest(2)).unwrap().is_some());
            assert!(index.lookup(&digest(3)).unwrap().is_some());
            index.insert(record(4, "bob")).unwrap();
        }

        let index = FileCertificateIndex::open(&path).unwrap();
        assert_eq!(index.len().unwrap(), 3);
        assert!(index.lookup(&digest(4)).unwrap().is_some());
    }

    #[test]
    fn open_creates_missing_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/certs.log");
        let index = FileCertificateIndex::open(&path).unwrap();
        assert!(index.is_empty().unwrap());
        assert!(path.exists());
        assert_eq!(index.path(), path.as_path());
    }

    #[test]
    fn list_by_owner_filters() {
        let dir = TempDir::new().unwrap();
        let index = FileCertificateIndex::open(dir.path().join("certs.log")).unwrap();
        index.insert(record(1, "alice")).unwrap();
        index.insert(record(2, "bob")).unwrap();
        index.insert(record(3, "alice")).unwrap();

        let alice = index.list_by_owner("alice").unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|r| r.owner == "alice"));
        assert_eq!(index.list().unwrap().len(), 3);
    }
}
