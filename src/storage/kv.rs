//! In-memory KV backing for a bucket, with namespaced key builders, ETag helpers
//! and bincode snapshots to `<bucket dir>/snapshot.bin`.

use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

use super::types::ObjectMeta;

#[inline]
fn ns(bucket: &str) -> String {
    format!("{}.bucket", bucket)
}

/// Build keys for bucket-scoped namespaces.
pub struct Keys;

impl Keys {
    pub fn object(bucket: &str, key_nfc: &str) -> String {
        format!("{}{}{}", ns(bucket), ".object::", key_nfc)
    }
    #[inline]
    pub fn object_prefix(bucket: &str) -> String { format!("{}{}", ns(bucket), ".object::") }
    pub fn blob(bucket: &str, object_id: &Uuid) -> String {
        format!("{}{}{}", ns(bucket), ".blob::", object_id)
    }
}

/// Content ETag: xxh3-64 as fixed-width hex.
pub fn etag_for_bytes(bytes: &[u8]) -> String {
    let h = xxh3_64(bytes);
    format!("{h:016x}")
}

/// Value variants held by a bucket's KV store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum KvValue {
    Meta(ObjectMeta),
    Bytes(Vec<u8>),
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    created_ms: i64,
    entries: Vec<(String, KvValue)>,
}

/// A single named in-memory KV store.
#[derive(Clone)]
pub struct KvStore {
    dir: PathBuf,
    map: Arc<parking_lot::RwLock<StdHashMap<String, KvValue>>>,
    dirty: Arc<AtomicBool>,
}

impl KvStore {
    /// Open the store rooted at `dir`, loading `snapshot.bin` when present.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create bucket directory: {}", dir.display()))?;
        let s = Self { dir, map: Arc::new(parking_lot::RwLock::new(StdHashMap::new())), dirty: Arc::new(AtomicBool::new(false)) };
        s.load_snapshot()?;
        Ok(s)
    }

    fn snapshot_path(&self) -> PathBuf { self.dir.join("snapshot.bin") }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Write all entries to disk if anything changed since the last save.
    /// Returns true when a snapshot was written.
    pub fn save_snapshot(&self) -> anyhow::Result<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) { return Ok(false); }
        let entries: Vec<(String, KvValue)> = self.map.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let snap = Snapshot { version: 1, created_ms: chrono::Utc::now().timestamp_millis(), entries };
        let write = || -> anyhow::Result<()> {
            let bytes = bincode::serialize(&snap)?;
            let tmp = self.snapshot_path().with_extension("bin.tmp");
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(tmp, self.snapshot_path())?;
            Ok(())
        };
        if let Err(e) = write() {
            // keep the change pending so the next tick retries
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(true)
    }

    fn load_snapshot(&self) -> anyhow::Result<()> {
        let path = self.snapshot_path();
        if !path.exists() { return Ok(()); }
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let snap: Snapshot = bincode::deserialize(&bytes)
            .with_context(|| format!("Corrupt bucket snapshot {}", path.display()))?;
        let mut w = self.map.write();
        w.clear();
        w.extend(snap.entries);
        Ok(())
    }

    pub fn set(&self, key: impl Into<String>, value: KvValue) {
        self.map.write().insert(key.into(), value);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn set_bytes(&self, key: impl Into<String>, bytes: &[u8]) {
        self.set(key, KvValue::Bytes(bytes.to_vec()));
    }

    pub fn get(&self, key: &str) -> Option<KvValue> {
        self.map.read().get(key).cloned()
    }

    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.get(key) {
            Some(KvValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.map.write().remove(key).is_some();
        if removed { self.dirty.store(true, Ordering::Release); }
        removed
    }

    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// All object metadata whose KV key starts with `prefix`.
    pub fn metas_with_prefix(&self, prefix: &str) -> Vec<ObjectMeta> {
        self.map
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter_map(|(_, v)| match v {
                KvValue::Meta(m) => Some(m.clone()),
                KvValue::Bytes(_) => None,
            })
            .collect()
    }
}
