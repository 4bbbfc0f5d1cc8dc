//! Core bucket operations: put/get/delete/list over the in-memory KV backend.
//! Mutations hold the bucket's write lock across their read-modify-write.

use anyhow::{bail, Result};
use chrono::Utc;
use uuid::Uuid;

use super::kv::{etag_for_bytes, Keys, KvValue};
use super::paths::{normalize_nfc, validate_object_key};
use super::types::{FileRecord, ObjectMeta};
use super::Bucket;

const MAX_CONTENT_TYPE_LEN: usize = 255;
const MAX_UPLOADER_LEN: usize = 255;

/// Store object bytes under `key` and write its metadata. Overwrites bump the version.
pub fn put_object(
    bucket: &Bucket,
    key: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    uploader: Option<&str>,
) -> Result<ObjectMeta> {
    put_object_at(bucket, key, bytes, content_type, uploader, Utc::now().timestamp_millis())
}

/// `put_object` with an explicit modification time (epoch milliseconds).
pub fn put_object_at(
    bucket: &Bucket,
    key: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    uploader: Option<&str>,
    now_ms: i64,
) -> Result<ObjectMeta> {
    validate_object_key(key)?;
    let key_nfc = normalize_nfc(key);
    if let Some(ct) = content_type {
        if ct.len() > MAX_CONTENT_TYPE_LEN { bail!("content_type_too_long"); }
    }
    if let Some(u) = uploader {
        if u.len() > MAX_UPLOADER_LEN { bail!("uploader_too_long"); }
    }

    let _writes = bucket.lock_writes();
    let kv = bucket.kv();
    let meta_key = Keys::object(bucket.name(), &key_nfc);
    let previous = match kv.get(&meta_key) {
        Some(KvValue::Meta(m)) => Some(m),
        Some(KvValue::Bytes(_)) => bail!("corrupt_meta"),
        None => None,
    };
    if let Some(prev) = &previous {
        if let Ok(old_id) = Uuid::parse_str(&prev.id) {
            kv.delete(&Keys::blob(bucket.name(), &old_id));
        }
    }

    let id = Uuid::new_v4();
    kv.set_bytes(Keys::blob(bucket.name(), &id), bytes);

    let etag = etag_for_bytes(bytes);
    let meta = ObjectMeta {
        id: id.to_string(),
        key: key_nfc.clone(),
        size: bytes.len() as u64,
        etag: etag.clone(),
        version: previous.as_ref().map(|p| p.version.saturating_add(1)).unwrap_or(1),
        created_at: previous.as_ref().filter(|p| !p.deleted).map(|p| p.created_at).unwrap_or(now_ms),
        last_modified: now_ms,
        content_type: content_type.map(|s| s.to_string()),
        uploader: uploader.map(|s| s.to_string()),
        deleted: false,
    };
    kv.set(meta_key, KvValue::Meta(meta.clone()));
    crate::tprintln!("BUCKET put_object ok bucket={} key={} size={} etag={} version={}",
        bucket.name(), key_nfc, meta.size, etag, meta.version);
    Ok(meta)
}

/// Fetch live metadata for a key, if present.
pub fn get_object(bucket: &Bucket, key: &str) -> Result<Option<ObjectMeta>> {
    Ok(get_meta_any(bucket, key)?.filter(|m| !m.deleted))
}

fn get_meta_any(bucket: &Bucket, key: &str) -> Result<Option<ObjectMeta>> {
    validate_object_key(key)?;
    let key_nfc = normalize_nfc(key);
    match bucket.kv().get(&Keys::object(bucket.name(), &key_nfc)) {
        Some(KvValue::Meta(m)) => Ok(Some(m)),
        Some(KvValue::Bytes(_)) => bail!("corrupt_meta"),
        None => Ok(None),
    }
}

/// Fetch raw bytes for an object by its metadata (id).
pub fn get_object_bytes(bucket: &Bucket, meta: &ObjectMeta) -> Result<Option<Vec<u8>>> {
    let id = Uuid::parse_str(&meta.id)?;
    Ok(bucket.kv().get_bytes(&Keys::blob(bucket.name(), &id)))
}

/// Soft-delete an object: tombstone the metadata and drop the blob.
pub fn delete_object(bucket: &Bucket, key: &str) -> Result<()> {
    let _writes = bucket.lock_writes();
    let Some(mut meta) = get_meta_any(bucket, key)? else { bail!("not_found") };
    if meta.deleted { return Ok(()); }
    let kv = bucket.kv();
    if let Ok(id) = Uuid::parse_str(&meta.id) {
        kv.delete(&Keys::blob(bucket.name(), &id));
    }
    meta.deleted = true;
    meta.last_modified = Utc::now().timestamp_millis();
    meta.version = meta.version.saturating_add(1);
    let meta_key = Keys::object(bucket.name(), &meta.key);
    crate::tprintln!("BUCKET delete_object ok bucket={} key={}", bucket.name(), meta.key);
    kv.set(meta_key, KvValue::Meta(meta));
    Ok(())
}

/// List live objects by key prefix, ordered by key. `None` or "" lists all.
pub fn list_objects(bucket: &Bucket, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
    let prefix_nfc = prefix.map(normalize_nfc).unwrap_or_default();
    let key_space_prefix = Keys::object(bucket.name(), &prefix_nfc);
    let mut out: Vec<ObjectMeta> = bucket
        .kv()
        .metas_with_prefix(&key_space_prefix)
        .into_iter()
        .filter(|m| !m.deleted)
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(out)
}

/// Fresh read-only view of every live object, in key order.
pub fn snapshot_records(bucket: &Bucket) -> Result<Vec<FileRecord>> {
    Ok(list_objects(bucket, None)?.iter().map(FileRecord::from_meta).collect())
}
