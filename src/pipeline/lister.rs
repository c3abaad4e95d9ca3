use anyhow::{Context, Result};
use async_channel::Sender;
use tracing::{debug, info, trace};

use crate::pipeline::filter::TimeWindowFilter;
use crate::pipeline::retry::RetryPolicy;
use crate::storage::Storage;
use crate::types::ObjectRecord;
use crate::types::error::S3relayError;
use crate::types::token::RunCancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingStats {
    pub listed: u64,
    pub eligible: u64,
}

/// Pages through the source and streams eligible records to the transfer stage.
pub struct ObjectLister {
    source: Storage,
    retry_policy: RetryPolicy,
    filter: TimeWindowFilter,
    max_keys: i32,
    cancellation_token: RunCancellationToken,
    sender: Sender<ObjectRecord>,
}

impl ObjectLister {
    pub fn new(
        source: Storage,
        retry_policy: RetryPolicy,
        filter: TimeWindowFilter,
        max_keys: i32,
        cancellation_token: RunCancellationToken,
        sender: Sender<ObjectRecord>,
    ) -> Self {
        Self {
            source,
            retry_policy,
            filter,
            max_keys,
            cancellation_token,
            sender,
        }
    }

    pub async fn list(&self) -> Result<ListingStats> {
        trace!(
            base_path = self.source.location().base_path.to_string(),
            "list source objects has started."
        );

        let mut stats = ListingStats::default();
        let mut continuation_token = None;

        loop {
            if self.cancellation_token.is_cancelled() {
                info!("listing has been cancelled.");
                return Ok(stats);
            }

            let outcome = self
                .retry_policy
                .execute("list_objects", &self.cancellation_token, |_| {
                    self.source
                        .list_objects_page(continuation_token.clone(), self.max_keys)
                })
                .await;
            let page = match outcome.result {
                Ok(page) => page,
                Err(e) if self.cancellation_token.is_cancelled() => {
                    debug!(error = format!("{e:#}"), "listing stopped by cancellation.");
                    return Ok(stats);
                }
                Err(e) => {
                    return Err(e).context(S3relayError::ListingFailed(
                        self.source.location().base_path.to_string(),
                    ));
                }
            };

            for record in page.records {
                stats.listed += 1;
                if !self.filter.is_eligible(&record) {
                    continue;
                }
                stats.eligible += 1;

                if self.sender.send(record).await.is_err() {
                    debug!("record receiver has been closed.");
                    return Ok(stats);
                }
            }

            continuation_token = page.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        info!(
            listed = stats.listed,
            eligible = stats.eligible,
            "list source objects has been completed."
        );

        Ok(stats)
    }
}
