use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::{Engine as _, engine::general_purpose};
use tracing::{debug, trace, warn};

use crate::storage::e_tag_verify::{generate_e_tag_hash, normalize_e_tag};
use crate::storage::s3::sdk_error;
use crate::storage::{ObjectReader, WrittenObject, read_chunk};
use crate::types::error::{S3relayError, StorageError};
use crate::types::token::RunCancellationToken;

/// Writes a body of known or unknown length in `multipart_chunksize` pieces.
///
/// A body that fits in one chunk goes out as a single `PutObject`; anything larger
/// becomes a multipart upload that is aborted on failure.
pub struct UploadManager {
    client: Arc<Client>,
    multipart_chunksize: u64,
    cancellation_token: RunCancellationToken,
    concatenated_md5_hash: Vec<u8>,
}

impl UploadManager {
    pub fn new(
        client: Arc<Client>,
        multipart_chunksize: u64,
        cancellation_token: RunCancellationToken,
    ) -> Self {
        UploadManager {
            client,
            multipart_chunksize,
            cancellation_token,
            concatenated_md5_hash: vec![],
        }
    }

    pub async fn upload(
        &mut self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
    ) -> Result<WrittenObject> {
        let first_chunk = read_chunk(&mut body, self.multipart_chunksize as usize).await?;

        if (first_chunk.len() as u64) < self.multipart_chunksize {
            return self.singlepart_upload(bucket, key, first_chunk).await;
        }

        self.multipart_upload(bucket, key, first_chunk, body).await
    }

    async fn singlepart_upload(
        &mut self,
        bucket: &str,
        key: &str,
        buffer: Vec<u8>,
    ) -> Result<WrittenObject> {
        let bytes = buffer.len() as u64;
        let md5_digest = md5::compute(&buffer);
        let md5_digest_base64 = general_purpose::STANDARD.encode(md5_digest.as_slice());

        let put_object_output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(bytes as i64)
            .content_md5(md5_digest_base64)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .map_err(|e| sdk_error(e, "put_object"))?;

        trace!(key = key, "{put_object_output:?}");

        Ok(WrittenObject {
            bytes,
            e_tag: put_object_output.e_tag().map(|e_tag| e_tag.to_string()),
        })
    }

    async fn multipart_upload(
        &mut self,
        bucket: &str,
        key: &str,
        first_chunk: Vec<u8>,
        body: ObjectReader,
    ) -> Result<WrittenObject> {
        let create_multipart_upload_output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(e, "create_multipart_upload"))?;
        let upload_id = create_multipart_upload_output
            .upload_id()
            .ok_or_else(|| anyhow!("create_multipart_upload() returned no upload id."))?
            .to_string();

        let upload_result = self
            .upload_parts_and_complete(bucket, key, &upload_id, first_chunk, body)
            .await
            .context("upload_parts_and_complete() failed.");

        if upload_result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    key = key,
                    upload_id = upload_id,
                    error = e.to_string(),
                    "abort_multipart_upload() failed."
                );
            }
        }

        upload_result
    }

    async fn upload_parts_and_complete(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first_chunk: Vec<u8>,
        mut body: ObjectReader,
    ) -> Result<WrittenObject> {
        let mut completed_parts = vec![];
        let mut bytes = 0;
        let mut part_number = 1;
        let mut chunk = first_chunk;

        loop {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(S3relayError::Cancelled));
            }

            let chunksize = chunk.len() as u64;
            let md5_digest = md5::compute(&chunk);
            self.concatenated_md5_hash
                .extend_from_slice(md5_digest.as_slice());

            let upload_part_output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_md5(general_purpose::STANDARD.encode(md5_digest.as_slice()))
                .content_length(chunksize as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| sdk_error(e, "upload_part"))?;

            debug!(key = key, part_number = part_number, size = chunksize, "part uploaded.");

            completed_parts.push(
                CompletedPart::builder()
                    .set_e_tag(upload_part_output.e_tag().map(|e_tag| e_tag.to_string()))
                    .part_number(part_number)
                    .build(),
            );
            bytes += chunksize;

            if chunksize < self.multipart_chunksize {
                break;
            }

            chunk = read_chunk(&mut body, self.multipart_chunksize as usize).await?;
            if chunk.is_empty() {
                break;
            }
            part_number += 1;
        }

        let complete_multipart_upload_output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(e, "complete_multipart_upload"))?;

        trace!(
            key = key,
            upload_id = upload_id,
            "{complete_multipart_upload_output:?}"
        );

        let e_tag = complete_multipart_upload_output
            .e_tag()
            .map(|e_tag| e_tag.to_string());
        let expected_e_tag =
            generate_e_tag_hash(&self.concatenated_md5_hash, part_number as usize);

        if let Some(actual_e_tag) = e_tag.as_deref() {
            if normalize_e_tag(actual_e_tag) != normalize_e_tag(&expected_e_tag) {
                return Err(anyhow!(StorageError::ValidationMismatch(format!(
                    "multipart etag of {key} differs: expected {expected_e_tag}, got {actual_e_tag}"
                ))));
            }
        }

        Ok(WrittenObject { bytes, e_tag })
    }
}
