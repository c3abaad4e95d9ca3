use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dyn_clone::DynClone;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Config;
use crate::config::LocationConfig;
use crate::types::ObjectRecord;
use crate::types::error::StorageError;
use crate::types::token::RunCancellationToken;

pub mod e_tag_verify;
pub mod memory;
pub mod s3;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// A readable object body. `content_length` is `None` when the size is only
/// known after the stream ends, for example after decompression.
pub struct ObjectData {
    pub reader: ObjectReader,
    pub content_length: Option<u64>,
    pub e_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectListPage {
    pub records: Vec<ObjectRecord>,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectAttributes {
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenObject {
    pub bytes: u64,
    pub e_tag: Option<String>,
}

#[async_trait]
pub trait StorageFactory {
    async fn create(
        config: &Config,
        location: LocationConfig,
        cancellation_token: RunCancellationToken,
    ) -> Storage;
}

/// One bucket location. Keys passed in and out are relative to the location's base path.
#[async_trait]
pub trait StorageTrait: DynClone {
    fn location(&self) -> &LocationConfig;
    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectListPage>;
    async fn head_object(&self, key: &str) -> Result<ObjectAttributes>;
    async fn get_object(&self, key: &str) -> Result<ObjectData>;
    async fn put_object(&self, key: &str, data: ObjectData) -> Result<WrittenObject>;
    /// Copies inside the service without moving the bytes through this process.
    async fn copy_object(
        &self,
        source: &LocationConfig,
        source_key: &str,
        key: &str,
    ) -> Result<WrittenObject>;
}

/// Reads until `chunksize` bytes are collected or the stream ends.
pub async fn read_chunk<R>(reader: &mut R, chunksize: usize) -> Result<Vec<u8>, StorageError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = Vec::with_capacity(chunksize);
    let mut limited = reader.take(chunksize as u64);
    limited
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| StorageError::from_io_error(&e))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_chunk_until_end() {
        init_dummy_tracing_subscriber();

        let mut reader: ObjectReader = Box::pin(std::io::Cursor::new(vec![7u8; 10]));

        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().len(), 2);
        assert!(read_chunk(&mut reader, 4).await.unwrap().is_empty());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
