use std::time::Duration;

use anyhow::{Result, anyhow};
use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::BufReader;
use tracing::{debug, trace};

use crate::config::{LocationConfig, TransferConfig};
use crate::formatter::is_gzip_key;
use crate::storage::e_tag_verify::verify_transfer;
use crate::storage::{ObjectData, Storage};
use crate::types::ObjectRecord;
use crate::types::error::StorageError;

// CopyObject refuses sources above 5 GiB.
const MAX_SERVER_SIDE_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const DECODER_BUFFER_SIZE: usize = 64 * 1024;

/// Moves one object to one destination and checks the result.
pub struct ObjectCopier {
    source: Storage,
    transfer_config: TransferConfig,
    worker_index: u16,
}

impl ObjectCopier {
    pub fn new(source: Storage, transfer_config: TransferConfig, worker_index: u16) -> Self {
        Self {
            source,
            transfer_config,
            worker_index,
        }
    }

    /// One attempt. Returns the number of bytes written to the destination.
    pub async fn copy(
        &self,
        record: &ObjectRecord,
        destination: &Storage,
        destination_key: &str,
    ) -> Result<u64> {
        let Some(timeout_milliseconds) = self.transfer_config.copy_attempt_timeout_milliseconds
        else {
            return self.copy_object(record, destination, destination_key).await;
        };

        tokio::time::timeout(
            Duration::from_millis(timeout_milliseconds),
            self.copy_object(record, destination, destination_key),
        )
        .await
        .map_err(|_| {
            anyhow!(StorageError::Timeout(format!(
                "copy of {} did not finish within {timeout_milliseconds}ms",
                record.relpath
            )))
        })?
    }

    async fn copy_object(
        &self,
        record: &ObjectRecord,
        destination: &Storage,
        destination_key: &str,
    ) -> Result<u64> {
        let location = destination.location();
        let decompress = location.unpack && is_gzip_key(&record.relpath);

        let written = if self.is_server_side_copy_possible(record, location, decompress) {
            trace!(
                worker_index = self.worker_index,
                relpath = record.relpath,
                "server side copy."
            );
            destination
                .copy_object(self.source.location(), &record.relpath, destination_key)
                .await?
        } else {
            let data = self.source.get_object(&record.relpath).await?;
            let data = if decompress {
                debug!(
                    worker_index = self.worker_index,
                    relpath = record.relpath,
                    "decompressing gzip payload."
                );
                decompress_gzip(data)
            } else {
                data
            };
            destination.put_object(destination_key, data).await?
        };

        // Unpacked objects change size and checksum, so only the write itself is trusted.
        if !location.unpack {
            let attributes = destination.head_object(destination_key).await?;
            verify_transfer(
                destination_key,
                record.size,
                Some(&record.etag),
                attributes.size,
                attributes.e_tag.as_deref(),
            )?;
        }

        Ok(written.bytes)
    }

    fn is_server_side_copy_possible(
        &self,
        record: &ObjectRecord,
        destination: &LocationConfig,
        decompress: bool,
    ) -> bool {
        self.transfer_config.server_side_copy
            && !decompress
            && record.size <= MAX_SERVER_SIDE_COPY_SIZE
            && self.source.location().is_same_service(destination)
    }
}

fn decompress_gzip(data: ObjectData) -> ObjectData {
    let mut decoder = GzipDecoder::new(BufReader::with_capacity(DECODER_BUFFER_SIZE, data.reader));
    decoder.multiple_members(true);

    ObjectData {
        reader: Box::pin(decoder),
        content_length: None,
        e_tag: None,
    }
}
