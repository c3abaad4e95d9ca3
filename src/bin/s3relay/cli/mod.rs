use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

use s3relay::Config;
use s3relay::config::{RunMode, SendInput};
use s3relay::pipeline::listing_file::{ListingFormat, read_listing, write_listing};
use s3relay::pipeline::summary::TransferSummary;
use s3relay::pipeline::{Pipeline, ensure_objects_found};
use s3relay::types::error::S3relayError;
use s3relay::types::token::create_run_cancellation_token;

mod ctrl_c_handler;

const EXIT_CODE_SUCCESS: i32 = 0;
const EXIT_CODE_NO_OBJECTS_FOUND: i32 = 3;
const EXIT_CODE_TRANSFER_FAILED: i32 = 4;

const TRANSFER_SUMMARY_NAME: &str = "TRANSFER_SUMMARY";

/// Runs one subcommand. Runtime errors are returned; the other non-zero outcomes exit here.
pub async fn run(config: Config) -> Result<()> {
    let exit_code = {
        let cancellation_token = create_run_cancellation_token();
        ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

        let start_time = Instant::now();
        trace!("s3relay run start.");

        let pipeline = Pipeline::new(config.clone(), cancellation_token).await;
        let result = match &config.mode {
            RunMode::List { output, format } => list(&pipeline, output.as_deref(), *format).await,
            RunMode::Send(input) => match send(&pipeline, input).await {
                Ok(summary) => report_summary(&config, &summary),
                Err(e) => Err(e),
            },
            RunMode::Sync => match pipeline.run().await {
                Ok(summary) => report_summary(&config, &summary),
                Err(e) => Err(e),
            },
        };

        let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
        let exit_code = match result {
            Ok(exit_code) => exit_code,
            Err(e) => {
                error!(
                    duration_sec = duration_sec,
                    error = format!("{e:#}"),
                    "s3relay failed."
                );
                return Err(e);
            }
        };

        if pipeline.is_cancelled() {
            warn!(duration_sec = duration_sec, "s3relay has been cancelled.");
            return Err(anyhow!(S3relayError::Cancelled));
        }

        trace!(duration_sec = duration_sec, "s3relay has been completed.");
        exit_code
    };

    if exit_code != EXIT_CODE_SUCCESS {
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn list(pipeline: &Pipeline, output: Option<&Path>, format: ListingFormat) -> Result<i32> {
    let (records, listing) = pipeline.list();

    let written = match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_listing(records, &mut file, format).await?
        }
        None => write_listing(records, &mut tokio::io::stdout(), format).await?,
    };

    let stats = match listing.await.context("listing task failed.")? {
        Ok(stats) => stats,
        Err(e) => {
            // A partial listing must not be picked up by a later send.
            if let Some(path) = output {
                remove_partial_listing(path).await;
            }
            return Err(e);
        }
    };

    info!(
        listed = stats.listed,
        eligible = stats.eligible,
        written = written,
        "listing has been written."
    );

    if written == 0 {
        warn!("{}", S3relayError::NoObjectsFound);
        return Ok(EXIT_CODE_NO_OBJECTS_FOUND);
    }

    Ok(EXIT_CODE_SUCCESS)
}

async fn remove_partial_listing(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                path = path.display().to_string(),
                error = e.to_string(),
                "remove partial listing file failed."
            );
            false
        }
    }
}

async fn send(pipeline: &Pipeline, input: &SendInput) -> Result<TransferSummary> {
    match input {
        SendInput::ListingFile(path) => {
            let (records, reading) = read_listing(path);
            let summary = pipeline.transfer(records).await;
            reading.await.context("listing file reader failed.")??;

            Ok(summary)
        }
        SendInput::Key(key) => {
            let record = pipeline.head_source(key).await?;

            let (sender, receiver) = async_channel::bounded(1);
            sender.send(record).await?;
            drop(sender);

            Ok(pipeline.transfer(receiver).await)
        }
    }
}

/// Writes the summary to stdout and `--summary-file`, then picks the exit code.
fn report_summary(config: &Config, summary: &TransferSummary) -> Result<i32> {
    let json = summary.to_json()?;
    if let Some(path) = &config.summary_file {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    println!("{json}");

    info!(
        name = TRANSFER_SUMMARY_NAME,
        objects = summary.objects,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        retried = summary.retried,
        bytes_moved = summary.bytes_moved,
    );

    if let Err(e) = ensure_objects_found(summary) {
        warn!("{e}");
        return Ok(EXIT_CODE_NO_OBJECTS_FOUND);
    }
    if summary.has_failures() {
        warn!(failed = summary.failed, "some transfers failed.");
        return Ok(EXIT_CODE_TRANSFER_FAILED);
    }

    Ok(EXIT_CODE_SUCCESS)
}
