use crate::Config;
use crate::storage::s3::S3StorageFactory;
use crate::storage::{Storage, StorageFactory};
use crate::types::token::RunCancellationToken;

/// One S3 client per location: the source first, then every destination in order.
pub async fn create_storages(
    config: &Config,
    cancellation_token: RunCancellationToken,
) -> (Storage, Vec<Storage>) {
    let source =
        S3StorageFactory::create(config, config.source.clone(), cancellation_token.clone()).await;

    let mut destinations = Vec::with_capacity(config.destinations.len());
    for destination in &config.destinations {
        destinations.push(
            S3StorageFactory::create(config, destination.clone(), cancellation_token.clone())
                .await,
        );
    }

    (source, destinations)
}
