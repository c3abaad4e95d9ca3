//! In-process object store with S3-like semantics, used for dry wiring and tests.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::LocationConfig;
use crate::storage::{
    ObjectAttributes, ObjectData, ObjectListPage, Storage, StorageTrait, WrittenObject,
};
use crate::types::ObjectRecord;
use crate::types::error::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject {
    pub body: Vec<u8>,
    pub e_tag: String,
    pub last_modified: DateTime<Utc>,
}

impl MemoryObject {
    pub fn new(body: Vec<u8>, last_modified: DateTime<Utc>) -> Self {
        let e_tag = format!("\"{:x}\"", md5::compute(&body));
        MemoryObject {
            body,
            e_tag,
            last_modified,
        }
    }
}

type Bucket = BTreeMap<String, MemoryObject>;

/// Buckets shared by every [`MemoryStorage`] created from the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<BTreeMap<String, Bucket>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), MemoryObject::new(body.to_vec(), last_modified));
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<MemoryObject> {
        self.lock()
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn storage(&self, location: LocationConfig) -> Storage {
        Box::new(MemoryStorage {
            location,
            store: self.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bucket>> {
        // A panic while holding the lock leaves the maps consistent.
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn object(&self, bucket: &str, key: &str) -> Result<MemoryObject> {
        let buckets = self.lock();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| anyhow!(StorageError::NoSuchBucket(bucket.to_string())))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!(StorageError::NotFound(format!("{bucket}/{key}"))))
    }

    fn store(&self, bucket: &str, key: &str, object: MemoryObject) -> Result<()> {
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| anyhow!(StorageError::NoSuchBucket(bucket.to_string())))?;
        objects.insert(key.to_string(), object);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryStorage {
    location: LocationConfig,
    store: MemoryObjectStore,
}

#[async_trait]
impl StorageTrait for MemoryStorage {
    fn location(&self) -> &LocationConfig {
        &self.location
    }

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectListPage> {
        let base_path = &self.location.base_path;
        let buckets = self.store.lock();
        let objects = buckets
            .get(&base_path.bucket)
            .ok_or_else(|| anyhow!(StorageError::NoSuchBucket(base_path.bucket.clone())))?;

        let lower = match continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(base_path.prefix.clone()),
        };

        let mut records = Vec::new();
        let mut last_key = None;
        for (key, object) in objects.range((lower, Bound::Unbounded)) {
            if !key.starts_with(&base_path.prefix) {
                break;
            }
            if records.len() >= max_keys.max(1) as usize {
                return Ok(ObjectListPage {
                    records,
                    next_continuation_token: last_key,
                });
            }
            last_key = Some(key.clone());

            let Some(relpath) = base_path.relpath(key) else {
                continue;
            };
            if relpath.is_empty() || relpath.ends_with('/') {
                debug!(key = key, "directory marker skipped.");
                continue;
            }

            records.push(ObjectRecord {
                relpath: relpath.to_string(),
                size: object.body.len() as u64,
                last_modified: object.last_modified,
                etag: object.e_tag.clone(),
            });
        }

        Ok(ObjectListPage {
            records,
            next_continuation_token: None,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectAttributes> {
        let base_path = &self.location.base_path;
        let object = self
            .store
            .object(&base_path.bucket, &base_path.full_key(key))?;

        Ok(ObjectAttributes {
            size: object.body.len() as u64,
            e_tag: Some(object.e_tag),
            last_modified: object.last_modified,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectData> {
        let base_path = &self.location.base_path;
        let object = self
            .store
            .object(&base_path.bucket, &base_path.full_key(key))?;

        Ok(ObjectData {
            content_length: Some(object.body.len() as u64),
            e_tag: Some(object.e_tag),
            reader: Box::pin(std::io::Cursor::new(object.body)),
        })
    }

    async fn put_object(&self, key: &str, mut data: ObjectData) -> Result<WrittenObject> {
        let mut body = Vec::new();
        data.reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| anyhow!(StorageError::from_io_error(&e)))?;

        let base_path = &self.location.base_path;
        let object = MemoryObject::new(body, Utc::now());
        let written = WrittenObject {
            bytes: object.body.len() as u64,
            e_tag: Some(object.e_tag.clone()),
        };
        self.store
            .store(&base_path.bucket, &base_path.full_key(key), object)?;

        Ok(written)
    }

    async fn copy_object(
        &self,
        source: &LocationConfig,
        source_key: &str,
        key: &str,
    ) -> Result<WrittenObject> {
        let source_object = self.store.object(
            &source.base_path.bucket,
            &source.base_path.full_key(source_key),
        )?;

        let base_path = &self.location.base_path;
        let object = MemoryObject::new(source_object.body, Utc::now());
        let written = WrittenObject {
            bytes: object.body.len() as u64,
            e_tag: Some(object.e_tag.clone()),
        };
        self.store
            .store(&base_path.bucket, &base_path.full_key(key), object)?;

        Ok(written)
    }
}
