/*!
# Overview
s3relay moves objects between S3-compatible buckets on a schedule.
It is meant to run as a batch step: a listing phase enumerates the source objects modified
within a time window, and a transfer phase copies each of them to one or more destinations.

## Features
- Repartitioning
  A source template such as `{year}/{month}/{name}` parses each key into named fields, and a
  destination template such as `year={year}/month={month}/{name}` renders the new key.
  Run attributes (`date`, `datetime`, `year`, `month`, `day`, `hour`, `minute`, `second`,
  `weekday`) are available to destination templates as well.

- Inline gzip unpacking
  A destination with `unpack: true` receives `.gz` objects decompressed, under the key with the
  `.gz` suffix removed.

- Integrity check
  Size and ETag of every written object are compared with the source. Mismatches are retried.

- Isolation
  A failure for one object and one destination never affects the other pairs. Every pair ends
  up in the [`TransferSummary`](pipeline::summary::TransferSummary).

- Split runs
  `list` writes a listing file (NDJSON or a JSON array) that can be split by the caller and fed
  to separate `send` invocations.

## As a library
The CLI is a thin wrapper of [`Pipeline`](pipeline::Pipeline).

```
use chrono::Utc;

use s3relay::config::{Config, LocationConfig};
use s3relay::formatter::FormatTemplate;
use s3relay::pipeline::Pipeline;
use s3relay::storage::memory::MemoryObjectStore;
use s3relay::types::token::create_run_cancellation_token;

#[tokio::main]
async fn main() {
    let store = MemoryObjectStore::new();
    store.create_bucket("archive");
    store.insert("landing", "incoming/2024/03/a.csv", b"a,b,c", Utc::now());

    let mut source = LocationConfig::new("landing", "landing/incoming".parse().unwrap());
    source.formatter = Some(FormatTemplate::compile("{year}/{month}/{name}").unwrap());
    let mut destination = LocationConfig::new("archive", "archive".parse().unwrap());
    destination.formatter = Some(FormatTemplate::compile("y={year}/m={month}/{name}").unwrap());

    let config = Config::new(source.clone(), vec![destination.clone()]);
    let pipeline = Pipeline::with_storages(
        config,
        store.storage(source),
        vec![store.storage(destination)],
        create_run_cancellation_token(),
    );

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(store.keys("archive"), vec!["y=2024/m=03/a.csv"]);
}
```
*/

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::Pipeline;
pub use pipeline::summary::TransferSummary;

pub mod config;
pub mod formatter;
pub mod pipeline;
pub mod storage;
pub mod types;
