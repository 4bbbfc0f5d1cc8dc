//!
//! smartquery storage module
//! --------------------------
//! A local object bucket standing in for remote object storage. Each bucket lives
//! under `<data_root>/<bucket>/` and keeps object metadata and blobs in an
//! in-memory KV store that is periodically snapshotted to `snapshot.bin`.
//!
//! Key responsibilities:
//! - Object put/get/delete/list keyed by NFC-normalized logical keys.
//! - Uploader metadata attached per object at upload time.
//! - Producing fresh `FileRecord` snapshots for the query engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

pub mod kv;
pub mod ops;
pub mod paths;
pub mod types;

pub use kv::{KvStore, KvValue};
pub use ops::{delete_object, get_object, get_object_bytes, list_objects, put_object, put_object_at, snapshot_records};
pub use types::{FileRecord, ObjectMeta, UNKNOWN_UPLOADER};

/// Supplies the point-in-time file records one query runs against.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<FileRecord>>;
}

/// A named bucket handle. Cheap to clone; clones share the same KV store.
#[derive(Clone)]
pub struct Bucket {
    name: String,
    kv: KvStore,
    writes: Arc<Mutex<()>>,
}

impl Bucket {
    /// Open (or create) the bucket `name` under `data_root`.
    pub fn open(data_root: impl AsRef<Path>, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            anyhow::bail!("invalid bucket name '{}'", name);
        }
        let dir = data_root.as_ref().join(name);
        let kv = KvStore::open(&dir).with_context(|| format!("While opening bucket '{}'", name))?;
        debug!(target: "smartquery::storage", "bucket '{}' opened at '{}' entries={}", name, dir.display(), kv.len());
        Ok(Self { name: name.to_string(), kv, writes: Arc::new(Mutex::new(())) })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn kv(&self) -> &KvStore { &self.kv }

    /// Serializes object mutations; readers do not take it.
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock()
    }

    /// Persist pending changes; returns true when a snapshot was written.
    pub fn flush(&self) -> Result<bool> {
        self.kv.save_snapshot().with_context(|| format!("While saving snapshot for bucket '{}'", self.name))
    }
}

impl SnapshotSource for Bucket {
    fn snapshot(&self) -> Result<Vec<FileRecord>> {
        snapshot_records(self)
    }
}
