use anyhow::Error;
use async_channel::{Receiver, Sender};
use tokio::task::JoinSet;
use tracing::{error, info, trace, warn};

use crate::Config;
use crate::formatter::KeyFormatter;
use crate::pipeline::copier::ObjectCopier;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::summary::TransferSummary;
use crate::storage::Storage;
use crate::types::error::{FormatterError, is_cancelled_error, is_transient_error};
use crate::types::token::RunCancellationToken;
use crate::types::{ErrorClass, ObjectRecord, TransferResult, TransferStatus};

const RESULT_CHANNEL_CAPACITY: usize = 1000;

/// Fans every record out to every destination on a pool of workers.
///
/// Workers report over a channel to the single summary owner in [`TransferEngine::run`].
pub struct TransferEngine {
    config: Config,
    source: Storage,
    destinations: Vec<Storage>,
    key_formatter: KeyFormatter,
    retry_policy: RetryPolicy,
    cancellation_token: RunCancellationToken,
}

impl TransferEngine {
    pub fn new(
        config: Config,
        source: Storage,
        destinations: Vec<Storage>,
        key_formatter: KeyFormatter,
        retry_policy: RetryPolicy,
        cancellation_token: RunCancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            destinations,
            key_formatter,
            retry_policy,
            cancellation_token,
        }
    }

    pub async fn run(&self, records: Receiver<ObjectRecord>) -> TransferSummary {
        let (result_sender, result_receiver) = async_channel::bounded(RESULT_CHANNEL_CAPACITY);

        let mut workers = JoinSet::new();
        for worker_index in 0..self.config.worker_size.max(1) {
            let worker = self.create_worker(worker_index, records.clone(), result_sender.clone());
            workers.spawn(worker.run());
        }
        drop(result_sender);

        let mut summary = TransferSummary::default();
        while let Ok(result) = result_receiver.recv().await {
            summary.add(result);
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(records) => summary.objects += records,
                Err(e) => error!(error = e.to_string(), "transfer worker panicked."),
            }
        }

        info!(
            objects = summary.objects,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            bytes_moved = summary.bytes_moved,
            "transfer run finished."
        );

        summary
    }

    fn create_worker(
        &self,
        worker_index: u16,
        receiver: Receiver<ObjectRecord>,
        sender: Sender<TransferResult>,
    ) -> TransferWorker {
        TransferWorker {
            worker_index,
            copier: ObjectCopier::new(
                dyn_clone::clone_box(&*self.source),
                self.config.transfer_config,
                worker_index,
            ),
            destinations: self
                .destinations
                .iter()
                .map(|destination| dyn_clone::clone_box(&**destination))
                .collect(),
            key_formatter: self.key_formatter.clone(),
            retry_policy: self.retry_policy.clone(),
            receiver,
            sender,
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}

struct TransferWorker {
    worker_index: u16,
    copier: ObjectCopier,
    destinations: Vec<Storage>,
    key_formatter: KeyFormatter,
    retry_policy: RetryPolicy,
    receiver: Receiver<ObjectRecord>,
    sender: Sender<TransferResult>,
    cancellation_token: RunCancellationToken,
}

impl TransferWorker {
    /// Returns the number of records this worker took.
    async fn run(self) -> u64 {
        trace!(worker_index = self.worker_index, "transfer worker has started.");

        let mut records = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "transfer worker has been cancelled.");
                    break;
                }
                recv_result = self.receiver.recv() => {
                    match recv_result {
                        Ok(record) => {
                            records += 1;
                            if !self.transfer_record(&record).await {
                                break;
                            }
                        }
                        Err(_) => {
                            trace!(worker_index = self.worker_index, "transfer worker has been completed.");
                            break;
                        }
                    }
                }
            }
        }

        records
    }

    // false once nobody listens for results any more.
    async fn transfer_record(&self, record: &ObjectRecord) -> bool {
        for destination in &self.destinations {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let result = self.transfer(record, destination).await;
            if self.sender.send(result).await.is_err() {
                return false;
            }
        }

        true
    }

    async fn transfer(&self, record: &ObjectRecord, destination: &Storage) -> TransferResult {
        let location = destination.location();

        let destination_key = match self
            .key_formatter
            .destination_key(&record.relpath, location)
        {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    worker_index = self.worker_index,
                    relpath = record.relpath,
                    destination = location.name,
                    error = e.to_string(),
                    "destination key cannot be computed."
                );
                let error_class = match e {
                    FormatterError::MissingField { .. } => ErrorClass::MissingField,
                    _ => ErrorClass::KeyParse,
                };
                return TransferResult {
                    relpath: record.relpath.clone(),
                    destination: location.name.clone(),
                    destination_key: None,
                    status: TransferStatus::Failed,
                    bytes: 0,
                    attempts: 0,
                    error_class: Some(error_class),
                    error: Some(e.to_string()),
                };
            }
        };

        let outcome = self
            .retry_policy
            .execute("copy", &self.cancellation_token, |_| {
                self.copier.copy(record, destination, &destination_key)
            })
            .await;
        let status = outcome.status();

        let mut result = TransferResult {
            relpath: record.relpath.clone(),
            destination: location.name.clone(),
            destination_key: Some(destination_key),
            status,
            bytes: 0,
            attempts: outcome.attempts,
            error_class: None,
            error: None,
        };

        match outcome.result {
            Ok(bytes) => {
                result.bytes = bytes;
                info!(
                    worker_index = self.worker_index,
                    relpath = result.relpath,
                    destination = result.destination,
                    destination_key = result.destination_key,
                    size = bytes,
                    attempts = result.attempts,
                    "transfer completed."
                );
            }
            Err(e) => {
                if is_cancelled_error(&e) {
                    warn!(
                        worker_index = self.worker_index,
                        relpath = result.relpath,
                        destination = result.destination,
                        "transfer cancelled."
                    );
                } else {
                    log_failure(self.worker_index, &result, &e);
                }
                result.error_class = Some(if is_transient_error(&e) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::NonTransient
                });
                result.error = Some(format!("{e:#}"));
            }
        }

        result
    }
}

fn log_failure(worker_index: u16, result: &TransferResult, e: &Error) {
    error!(
        worker_index = worker_index,
        relpath = result.relpath,
        destination = result.destination,
        status = format!("{:?}", result.status),
        attempts = result.attempts,
        error = format!("{e:#}"),
        "transfer failed."
    );
}
