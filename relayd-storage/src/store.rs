//! Durable message log with on-disk schema management.

use crate::error::StorageError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema metadata persisted at `<dir>/schema.json`.
#[derive(Debug, Serialize, Deserialize)]
struct SchemaMeta {
    schema_version: u32,
}

/// One persisted message record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Monotonic sequence number, 1-based.
    pub seq: u64,
    /// Peer address the message came from.
    pub peer: String,
    /// Message text.
    pub text: String,
    /// Receive time, seconds since the Unix epoch.
    pub received_at: u64,
}

/// Append-only message log.
///
/// `ensure_schema` must be called once before any append; it creates the
/// directory layout, verifies the schema version, and opens the log file.
pub struct MessageStore {
    dir: PathBuf,

    /// Open append handle; `None` until `ensure_schema` succeeds.
    log: Mutex<Option<BufWriter<File>>>,

    /// Last assigned sequence number.
    seq: AtomicU64,
}

impl MessageStore {
    /// Creates a store rooted at the given directory. No I/O happens here.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            log: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates or validates the on-disk layout. Idempotent.
    ///
    /// Layout: `<dir>/schema.json` and `<dir>/messages/messages.jsonl`.
    /// Existing records are counted to recover the sequence counter.
    pub fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut log = self.log.lock();
        if log.is_some() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)?;
        fs::create_dir_all(self.messages_dir())?;

        let meta_path = self.dir.join("schema.json");
        if meta_path.exists() {
            let file = File::open(&meta_path)?;
            let meta: SchemaMeta = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| StorageError::Corruption(format!("invalid schema.json: {}", e)))?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(StorageError::SchemaVersionMismatch {
                    found: meta.schema_version,
                    expected: SCHEMA_VERSION,
                });
            }
        } else {
            let file = File::create(&meta_path)?;
            serde_json::to_writer_pretty(
                BufWriter::new(file),
                &SchemaMeta {
                    schema_version: SCHEMA_VERSION,
                },
            )?;
        }

        let log_path = self.log_path();
        let existing = if log_path.exists() {
            let file = File::open(&log_path)?;
            BufReader::new(file).lines().count() as u64
        } else {
            0
        };
        self.seq.store(existing, Ordering::SeqCst);

        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        *log = Some(BufWriter::new(file));

        tracing::info!(
            "Schema ensured at {} ({} existing messages)",
            self.dir.display(),
            existing
        );
        Ok(())
    }

    /// Appends one message and returns its sequence number.
    pub fn append(&self, peer: &str, text: &str) -> Result<u64, StorageError> {
        let mut log = self.log.lock();
        let writer = log.as_mut().ok_or(StorageError::SchemaNotReady)?;

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = StoredMessage {
            seq,
            peer: peer.to_string(),
            text: text.to_string(),
            received_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        writer.flush()?;

        Ok(seq)
    }

    /// Number of messages persisted so far (including recovered ones).
    pub fn message_count(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    fn messages_dir(&self) -> PathBuf {
        self.dir.join("messages")
    }

    fn log_path(&self) -> PathBuf {
        self.messages_dir().join("messages.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_before_ensure_fails() {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path());
        assert!(matches!(
            store.append("peer", "hello"),
            Err(StorageError::SchemaNotReady)
        ));
    }

    #[test]
    fn test_ensure_schema_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path());
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert!(dir.path().join("schema.json").exists());
        assert!(dir.path().join("messages").is_dir());
    }

    #[test]
    fn test_append_and_count() {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path());
        store.ensure_schema().unwrap();

        assert_eq!(store.append("127.0.0.1:4000", "first").unwrap(), 1);
        assert_eq!(store.append("127.0.0.1:4000", "second").unwrap(), 2);
        assert_eq!(store.message_count(), 2);
    }

    #[test]
    fn test_sequence_recovered_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = MessageStore::open(dir.path());
            store.ensure_schema().unwrap();
            store.append("a", "one").unwrap();
            store.append("a", "two").unwrap();
        }

        let store = MessageStore::open(dir.path());
        store.ensure_schema().unwrap();
        assert_eq!(store.message_count(), 2);
        assert_eq!(store.append("b", "three").unwrap(), 3);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("schema.json"), r#"{"schema_version": 99}"#).unwrap();

        let store = MessageStore::open(dir.path());
        assert!(matches!(
            store.ensure_schema(),
            Err(StorageError::SchemaVersionMismatch {
                found: 99,
                expected: SCHEMA_VERSION
            })
        ));
    }

    #[test]
    fn test_ensure_schema_fails_on_file_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-dir");
        fs::write(&path, b"occupied").unwrap();

        let store = MessageStore::open(&path);
        assert!(store.ensure_schema().is_err());
    }
}
