use anyhow::{Context, Result, anyhow};
use async_channel::Receiver;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::Config;
use crate::formatter::KeyFormatter;
use crate::pipeline::engine::TransferEngine;
use crate::pipeline::filter::TimeWindowFilter;
use crate::pipeline::lister::{ListingStats, ObjectLister};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summary::TransferSummary;
use crate::storage::Storage;
use crate::types::ObjectRecord;
use crate::types::error::S3relayError;
use crate::types::token::RunCancellationToken;

const CHANNEL_CAPACITY: usize = 1000;

mod copier;
pub mod engine;
pub mod filter;
pub mod lister;
pub mod listing_file;
pub mod retry;
mod storage_factory;
pub mod summary;

/// One run over a source and its destinations.
///
/// The run time is fixed when the pipeline is created; both the time window and the
/// run fields used in destination keys derive from it.
pub struct Pipeline {
    config: Config,
    source: Storage,
    destinations: Vec<Storage>,
    retry_policy: RetryPolicy,
    now: DateTime<Utc>,
    cancellation_token: RunCancellationToken,
}

impl Pipeline {
    pub async fn new(config: Config, cancellation_token: RunCancellationToken) -> Self {
        let (source, destinations) =
            storage_factory::create_storages(&config, cancellation_token.clone()).await;

        Self::with_storages(config, source, destinations, cancellation_token)
    }

    /// A pipeline over already created storages.
    pub fn with_storages(
        config: Config,
        source: Storage,
        destinations: Vec<Storage>,
        cancellation_token: RunCancellationToken,
    ) -> Self {
        let retry_policy = RetryPolicy::from_config(&config.retry_config);

        Self {
            config,
            source,
            destinations,
            retry_policy,
            now: Utc::now(),
            cancellation_token,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_run_time(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn run_time(&self) -> DateTime<Utc> {
        self.now
    }

    /// Starts paging the source. Records arrive on the receiver as pages come in; the
    /// handle resolves once listing has finished or failed.
    pub fn list(&self) -> (Receiver<ObjectRecord>, JoinHandle<Result<ListingStats>>) {
        let (sender, receiver) = async_channel::bounded(CHANNEL_CAPACITY);

        let lister = ObjectLister::new(
            dyn_clone::clone_box(&*self.source),
            self.retry_policy.clone(),
            TimeWindowFilter::new(self.now, &self.config.listing_config),
            self.config.listing_config.max_keys,
            self.cancellation_token.clone(),
            sender,
        );

        let handle = tokio::spawn(async move {
            let result = lister.list().await;
            if let Err(e) = &result {
                error!(error = format!("{e:#}"), "list source objects failed.");
            }
            result
        });

        (receiver, handle)
    }

    /// Copies every record to every destination. Never fails; failures are in the summary.
    pub async fn transfer(&self, records: Receiver<ObjectRecord>) -> TransferSummary {
        let engine = TransferEngine::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.source),
            self.destinations
                .iter()
                .map(|destination| dyn_clone::clone_box(&**destination))
                .collect(),
            KeyFormatter::new(self.config.source.formatter.clone(), self.now),
            self.retry_policy.clone(),
            self.cancellation_token.clone(),
        );

        engine.run(records).await
    }

    /// Lists and transfers concurrently. A listing failure fails the whole run.
    pub async fn run(&self) -> Result<TransferSummary> {
        trace!("pipeline run has started.");

        let (records, listing) = self.list();
        let summary = self.transfer(records).await;

        let stats = listing
            .await
            .map_err(|e| anyhow!("listing task failed: {e}"))??;
        debug!(
            listed = stats.listed,
            eligible = stats.eligible,
            "pipeline run has been completed."
        );

        Ok(summary)
    }

    /// The record for a single source object, for transfers named by key.
    pub async fn head_source(&self, relpath: &str) -> Result<ObjectRecord> {
        let attributes = self
            .source
            .head_object(relpath)
            .await
            .with_context(|| format!("source object not found: {relpath}"))?;

        Ok(ObjectRecord {
            relpath: relpath.to_string(),
            size: attributes.size,
            last_modified: attributes.last_modified,
            etag: attributes.e_tag.unwrap_or_default(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Fails with [`S3relayError::NoObjectsFound`] when a run had nothing to move.
pub fn ensure_objects_found(summary: &TransferSummary) -> Result<()> {
    if summary.objects == 0 {
        return Err(anyhow!(S3relayError::NoObjectsFound));
    }

    Ok(())
}
