use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::Config;
use crate::config::LocationConfig;
use crate::storage::s3::upload_manager::UploadManager;
use crate::storage::{
    ObjectAttributes, ObjectData, ObjectListPage, Storage, StorageFactory, StorageTrait,
    WrittenObject,
};
use crate::types::ObjectRecord;
use crate::types::error::StorageError;
use crate::types::token::RunCancellationToken;

mod client_builder;
mod upload_manager;

pub struct S3StorageFactory {}

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(
        config: &Config,
        location: LocationConfig,
        cancellation_token: RunCancellationToken,
    ) -> Storage {
        let client = config.client_config(&location).create_client().await;

        Box::new(S3Storage {
            location,
            client: Arc::new(client),
            multipart_chunksize: config.transfer_config.multipart_chunksize,
            cancellation_token,
        })
    }
}

#[derive(Clone)]
struct S3Storage {
    location: LocationConfig,
    client: Arc<Client>,
    multipart_chunksize: u64,
    cancellation_token: RunCancellationToken,
}

impl S3Storage {
    fn bucket(&self) -> &str {
        &self.location.base_path.bucket
    }

    fn full_key(&self, key: &str) -> String {
        self.location.base_path.full_key(key)
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn location(&self) -> &LocationConfig {
        &self.location
    }

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectListPage> {
        let base_path = &self.location.base_path;
        let list_objects_output = self
            .client
            .list_objects_v2()
            .bucket(&base_path.bucket)
            .prefix(&base_path.prefix)
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| sdk_error(e, "list_objects_v2"))?;

        let mut records = Vec::with_capacity(list_objects_output.contents().len());
        for object in list_objects_output.contents() {
            let Some(key) = object.key() else {
                continue;
            };
            let relpath = base_path.relpath(key).unwrap_or(key);
            if relpath.is_empty() || relpath.ends_with('/') {
                debug!(key = key, "directory marker skipped.");
                continue;
            }

            records.push(ObjectRecord {
                relpath: relpath.to_string(),
                size: object.size().unwrap_or_default().max(0) as u64,
                last_modified: to_chrono(object.last_modified())?,
                etag: object.e_tag().unwrap_or_default().to_string(),
            });
        }

        let next_continuation_token = if list_objects_output.is_truncated().unwrap_or(false) {
            list_objects_output
                .next_continuation_token()
                .map(|token| token.to_string())
        } else {
            None
        };

        trace!(
            bucket = base_path.bucket,
            count = records.len(),
            truncated = next_continuation_token.is_some(),
            "list_objects_v2() page received."
        );

        Ok(ObjectListPage {
            records,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectAttributes> {
        let head_object_output = self
            .client
            .head_object()
            .bucket(self.bucket())
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| sdk_error(e, "head_object"))?;

        Ok(ObjectAttributes {
            size: head_object_output.content_length().unwrap_or_default().max(0) as u64,
            e_tag: head_object_output.e_tag().map(|e_tag| e_tag.to_string()),
            last_modified: to_chrono(head_object_output.last_modified())?,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectData> {
        let get_object_output = self
            .client
            .get_object()
            .bucket(self.bucket())
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| sdk_error(e, "get_object"))?;

        Ok(ObjectData {
            content_length: get_object_output
                .content_length()
                .map(|length| length.max(0) as u64),
            e_tag: get_object_output.e_tag().map(|e_tag| e_tag.to_string()),
            reader: Box::pin(get_object_output.body.into_async_read()),
        })
    }

    async fn put_object(&self, key: &str, data: ObjectData) -> Result<WrittenObject> {
        let target_key = self.full_key(key);

        let mut upload_manager = UploadManager::new(
            self.client.clone(),
            self.multipart_chunksize,
            self.cancellation_token.clone(),
        );
        let written = upload_manager
            .upload(self.bucket(), &target_key, data.reader)
            .await?;

        info!(
            bucket = self.bucket(),
            target_key = target_key,
            size = written.bytes,
            "object uploaded."
        );

        Ok(written)
    }

    async fn copy_object(
        &self,
        source: &LocationConfig,
        source_key: &str,
        key: &str,
    ) -> Result<WrittenObject> {
        let source_full_key = source.base_path.full_key(source_key);
        let copy_source = format!(
            "{}/{}",
            source.base_path.bucket,
            urlencoding::encode(&source_full_key)
        );

        let copy_object_output = self
            .client
            .copy_object()
            .copy_source(copy_source)
            .bucket(self.bucket())
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| sdk_error(e, "copy_object"))?;

        trace!(key = key, "{copy_object_output:?}");

        let attributes = self.head_object(key).await?;

        info!(
            source_key = source_full_key,
            target_key = self.full_key(key),
            size = attributes.size,
            "object copied on server side."
        );

        Ok(WrittenObject {
            bytes: attributes.size,
            e_tag: attributes.e_tag,
        })
    }
}

fn to_chrono(date_time: Option<&aws_smithy_types::DateTime>) -> Result<DateTime<Utc>> {
    match date_time {
        Some(date_time) => date_time
            .to_chrono_utc()
            .context("aws_smithy_types::DateTime::to_chrono_utc() failed."),
        None => Ok(DateTime::<Utc>::UNIX_EPOCH),
    }
}

/// Classifies an SDK failure and wraps it with the failing operation name.
pub(crate) fn sdk_error<E>(e: SdkError<E, HttpResponse>, operation: &str) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    anyhow::Error::new(classify_sdk_error(&e))
        .context(format!("aws_sdk_s3::client::{operation}() failed."))
}

fn classify_sdk_error<E>(e: &SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(e).to_string();
    match e {
        SdkError::TimeoutError(_) => StorageError::Timeout(message),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            StorageError::Timeout(message)
        }
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Network(message)
        }
        SdkError::ConstructionFailure(_) => StorageError::InvalidRequest(message),
        SdkError::ServiceError(service_error) => StorageError::from_service_response(
            service_error.raw().status().as_u16(),
            service_error.err().code(),
            message,
        ),
        _ => StorageError::Network(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error::is_transient_error;
    use crate::types::token::create_run_cancellation_token;

    fn unreachable_location() -> LocationConfig {
        let mut location = LocationConfig::new("target", "dummy-bucket/prefix".parse().unwrap());
        location.endpoint_url = Some("https://invalid-s3-endpoint-url.6329313.local:65535".to_string());
        location.region = Some("my-region".to_string());
        location.credential = crate::types::S3Credentials::Credentials {
            access_keys: crate::types::AccessKeys {
                access_key: "dummy_access_key".to_string(),
                secret_access_key: "dummy_secret_access_key".to_string(),
                session_token: None,
            },
        };
        location
    }

    #[tokio::test]
    async fn create_storage() {
        init_dummy_tracing_subscriber();

        let location = unreachable_location();
        let config = Config::new(location.clone(), vec![location.clone()]);
        let storage =
            S3StorageFactory::create(&config, location.clone(), create_run_cancellation_token())
                .await;

        assert_eq!(storage.location(), &location);
    }

    #[tokio::test]
    async fn get_object_error_is_transient() {
        init_dummy_tracing_subscriber();

        let location = unreachable_location();
        let mut config = Config::new(location.clone(), vec![location.clone()]);
        config.timeout_config.connect_timeout_milliseconds = Some(1000);
        let storage =
            S3StorageFactory::create(&config, location, create_run_cancellation_token()).await;

        let e = storage.get_object("source/data1").await.err().unwrap();
        assert!(is_transient_error(&e));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
