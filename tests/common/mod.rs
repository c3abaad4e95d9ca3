#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use s3relay::Config;
use s3relay::config::LocationConfig;
use s3relay::formatter::FormatTemplate;
use s3relay::pipeline::Pipeline;
use s3relay::pipeline::retry::RetryPolicy;
use s3relay::storage::memory::MemoryObjectStore;
use s3relay::storage::{
    ObjectAttributes, ObjectData, ObjectListPage, Storage, StorageTrait, WrittenObject,
};
use s3relay::types::error::{StorageError, is_transient_error};
use s3relay::types::token::{RunCancellationToken, create_run_cancellation_token};

pub const SOURCE_BUCKET: &str = "landing";

/// Errors to return instead of calling the wrapped storage, consumed in order.
#[derive(Clone, Default)]
pub struct FaultInjector {
    write_faults: Arc<Mutex<HashMap<String, VecDeque<StorageError>>>>,
    list_faults: Arc<Mutex<VecDeque<StorageError>>>,
    write_attempts: Arc<Mutex<HashMap<String, u32>>>,
    write_stall: Arc<Mutex<Option<Duration>>>,
}

impl FaultInjector {
    pub fn fail_writes(&self, key: &str, errors: Vec<StorageError>) {
        self.write_faults
            .lock()
            .unwrap()
            .insert(key.to_string(), errors.into());
    }

    /// Every write sleeps for `stall` before reaching the wrapped storage.
    pub fn stall_writes(&self, stall: Duration) {
        *self.write_stall.lock().unwrap() = Some(stall);
    }

    pub fn fail_lists(&self, errors: Vec<StorageError>) {
        *self.list_faults.lock().unwrap() = errors.into();
    }

    pub fn write_attempts(&self, key: &str) -> u32 {
        self.write_attempts
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    fn next_write_fault(&self, key: &str) -> Option<StorageError> {
        *self
            .write_attempts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default() += 1;

        self.write_faults
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }

    async fn stall(&self) {
        let stall = *self.write_stall.lock().unwrap();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
    }

    fn next_list_fault(&self) -> Option<StorageError> {
        self.list_faults.lock().unwrap().pop_front()
    }
}

pub struct FaultyStorage {
    inner: Storage,
    injector: FaultInjector,
}

impl FaultyStorage {
    pub fn wrap(inner: Storage, injector: FaultInjector) -> Storage {
        Box::new(FaultyStorage { inner, injector })
    }
}

impl Clone for FaultyStorage {
    fn clone(&self) -> Self {
        FaultyStorage {
            inner: dyn_clone::clone_box(&*self.inner),
            injector: self.injector.clone(),
        }
    }
}

#[async_trait]
impl StorageTrait for FaultyStorage {
    fn location(&self) -> &LocationConfig {
        self.inner.location()
    }

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectListPage> {
        if let Some(e) = self.injector.next_list_fault() {
            return Err(anyhow!(e));
        }
        self.inner
            .list_objects_page(continuation_token, max_keys)
            .await
    }

    async fn head_object(&self, key: &str) -> Result<ObjectAttributes> {
        self.inner.head_object(key).await
    }

    async fn get_object(&self, key: &str) -> Result<ObjectData> {
        self.inner.get_object(key).await
    }

    async fn put_object(&self, key: &str, data: ObjectData) -> Result<WrittenObject> {
        self.injector.stall().await;
        if let Some(e) = self.injector.next_write_fault(key) {
            return Err(anyhow!(e));
        }
        self.inner.put_object(key, data).await
    }

    async fn copy_object(
        &self,
        source: &LocationConfig,
        source_key: &str,
        key: &str,
    ) -> Result<WrittenObject> {
        self.injector.stall().await;
        if let Some(e) = self.injector.next_write_fault(key) {
            return Err(anyhow!(e));
        }
        self.inner.copy_object(source, source_key, key).await
    }
}

pub struct TestHelper {
    pub store: MemoryObjectStore,
    pub source_faults: FaultInjector,
    pub destination_faults: HashMap<String, FaultInjector>,
}

impl TestHelper {
    pub fn new() -> Self {
        TestHelper {
            store: MemoryObjectStore::new(),
            source_faults: FaultInjector::default(),
            destination_faults: HashMap::new(),
        }
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }

    pub fn put_source_object(&self, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        self.store
            .insert(SOURCE_BUCKET, &format!("incoming/{key}"), body, last_modified);
    }

    pub fn source_location(formatter: Option<&str>) -> LocationConfig {
        let mut location =
            LocationConfig::new("landing", format!("{SOURCE_BUCKET}/incoming").parse().unwrap());
        location.formatter = formatter.map(|template| FormatTemplate::compile(template).unwrap());
        location
    }

    pub fn destination_location(
        &self,
        name: &str,
        formatter: Option<&str>,
        unpack: bool,
    ) -> LocationConfig {
        self.store.create_bucket(name);

        let mut location = LocationConfig::new(name, format!("{name}/out").parse().unwrap());
        location.formatter = formatter.map(|template| FormatTemplate::compile(template).unwrap());
        location.unpack = unpack;
        location
    }

    pub fn destination_faults(&mut self, name: &str) -> FaultInjector {
        self.destination_faults
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn pipeline(&mut self, config: Config) -> Pipeline {
        self.pipeline_with_token(config, create_run_cancellation_token())
    }

    pub fn pipeline_with_token(
        &mut self,
        config: Config,
        cancellation_token: RunCancellationToken,
    ) -> Pipeline {
        let source = FaultyStorage::wrap(
            self.store.storage(config.source.clone()),
            self.source_faults.clone(),
        );
        let destinations = config
            .destinations
            .iter()
            .map(|destination| {
                let injector = self.destination_faults(&destination.name);
                FaultyStorage::wrap(self.store.storage(destination.clone()), injector)
            })
            .collect();

        Pipeline::with_storages(config, source, destinations, cancellation_token)
            .with_retry_policy(fast_retry_policy(3))
    }

    /// Keys under `out/` of a destination bucket, with the prefix removed.
    pub fn destination_keys(&self, name: &str) -> Vec<String> {
        self.store
            .keys(name)
            .into_iter()
            .filter_map(|key| key.strip_prefix("out/").map(str::to_string))
            .collect()
    }

    pub fn destination_body(&self, name: &str, key: &str) -> Vec<u8> {
        self.store
            .get(name, &format!("out/{key}"))
            .map(|object| object.body)
            .unwrap_or_default()
    }
}

pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2,
        is_retryable: is_transient_error,
    }
}
