use std::ffi::OsString;
use std::path::PathBuf;

use chrono::TimeDelta;
use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use crate::Config;
use crate::config::args::value_parser::{duration, file_exist, human_bytes};
use crate::config::file::LocationsFile;
use crate::config::{
    CLITimeoutConfig, DEFAULT_AWS_MAX_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT_MILLISECONDS,
    DEFAULT_INITIAL_BACKOFF_MILLISECONDS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MILLISECONDS,
    DEFAULT_MAX_KEYS, DEFAULT_READ_TIMEOUT_MILLISECONDS, DEFAULT_TIME_WINDOW, DEFAULT_WORKER_SIZE,
    ListingConfig, RetryConfig, RunMode, SendInput, TracingConfig, TransferConfig,
};
use crate::pipeline::listing_file::ListingFormat;

mod tests;
pub(crate) mod value_parser;

const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_MULTIPART_CHUNKSIZE: &str = "8MiB";
const DEFAULT_DISABLE_SERVER_SIDE_COPY: bool = false;
const DEFAULT_BACKFILL: bool = false;

const BACKOFF_RANGE_CONFLICT: &str =
    "--initial-backoff-milliseconds must be smaller than or equal to --max-backoff-milliseconds\n";

#[derive(Parser, Clone, Debug)]
#[command(version, about, propagate_version = true)]
pub struct CLIArgs {
    #[command(subcommand)]
    command: Command,

    /// YAML file with the source and destination locations
    #[arg(long, env = "S3RELAY_CONFIG_FILE", global = true, value_name = "FILE", value_parser = file_exist::is_file_exist, help_heading = "General")]
    config_file: Option<PathBuf>,

    /// write the transfer summary as JSON to this file
    #[arg(long, env, global = true, value_name = "FILE", help_heading = "General")]
    summary_file: Option<PathBuf>,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, global = true, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// enable aws sdk tracing
    #[arg(long, env, global = true, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    aws_sdk_tracing: bool,

    /// show span event tracing
    #[arg(long, env, global = true, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// number of workers for transfers
    #[arg(long, env, global = true, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    worker_size: u16,

    /// maximum number of objects returned in a single list object request
    #[arg(long, env, global = true, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=32767), help_heading = "Performance")]
    max_keys: i32,

    /// part size of multipart uploads and threshold for them. e.g. 8MiB
    #[arg(long, env, global = true, default_value = DEFAULT_MULTIPART_CHUNKSIZE, value_parser = human_bytes::parse_human_bytes, help_heading = "Multipart Settings")]
    multipart_chunksize: u64,

    /// attempts per object and destination, including the first one
    #[arg(long, env, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..), help_heading = "Retry Options")]
    max_attempts: u32,

    /// backoff before the second attempt. doubled on every further attempt
    #[arg(long, env, global = true, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, value_name = "initial_backoff", help_heading = "Retry Options")]
    initial_backoff_milliseconds: u64,

    /// upper bound of the backoff between attempts
    #[arg(long, env, global = true, default_value_t = DEFAULT_MAX_BACKOFF_MILLISECONDS, value_name = "max_backoff", help_heading = "Retry Options")]
    max_backoff_milliseconds: u64,

    /// maximum attempts of the AWS SDK retry handler for a single request
    #[arg(long, env, global = true, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..), value_name = "max_attempts", help_heading = "Retry Options")]
    aws_max_attempts: u32,

    /// operation timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(long, env, global = true, value_name = "operation_timeout", help_heading = "Timeout Options")]
    operation_timeout_milliseconds: Option<u64>,

    /// operation attempt timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(long, env, global = true, value_name = "operation_attempt_timeout", help_heading = "Timeout Options")]
    operation_attempt_timeout_milliseconds: Option<u64>,

    /// connect timeout (milliseconds).
    #[arg(long, env, global = true, default_value_t = DEFAULT_CONNECT_TIMEOUT_MILLISECONDS, value_name = "connect_timeout", help_heading = "Timeout Options")]
    connect_timeout_milliseconds: u64,

    /// read timeout (milliseconds).
    #[arg(long, env, global = true, default_value_t = DEFAULT_READ_TIMEOUT_MILLISECONDS, value_name = "read_timeout", help_heading = "Timeout Options")]
    read_timeout_milliseconds: u64,

    /// timeout (milliseconds) of one whole copy attempt of one object to one destination.
    /// The default has no timeout.
    #[arg(long, env, global = true, value_name = "copy_attempt_timeout", help_heading = "Timeout Options")]
    copy_attempt_timeout_milliseconds: Option<u64>,

    /// always stream objects through this process, even within the same service
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_SERVER_SIDE_COPY, help_heading = "Advanced")]
    disable_server_side_copy: bool,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// list eligible source objects as a listing file
    List(ListArgs),
    /// transfer the objects of a listing file, or a single object
    Send(SendArgs),
    /// list and transfer in one run
    Sync(TimeWindowArgs),
}

#[derive(Args, Clone, Debug)]
struct TimeWindowArgs {
    /// include every object regardless of its modification time
    #[arg(long, env, default_value_t = DEFAULT_BACKFILL, help_heading = "Listing")]
    backfill: bool,

    /// include objects modified within this window. e.g. 1d, 12h, 1d6h [default: 1d]
    #[arg(long, env, conflicts_with = "backfill", value_parser = duration::parse_time_window, help_heading = "Listing")]
    time_window: Option<TimeDelta>,
}

#[derive(Args, Clone, Debug)]
struct ListArgs {
    #[command(flatten)]
    time_window: TimeWindowArgs,

    /// listing file to write. stdout if omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ListingFormat::Ndjson)]
    format: ListingFormat,
}

#[derive(Args, Clone, Debug)]
struct SendArgs {
    /// listing file written by `list`, NDJSON or a JSON array
    #[arg(long, value_name = "FILE", conflicts_with = "key", required_unless_present = "key", value_parser = file_exist::is_file_exist)]
    listing_file: Option<PathBuf>,

    /// key of a single source object, relative to the source base path
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    key: Option<String>,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_config(&self) -> Result<(), String> {
        if self.initial_backoff_milliseconds > self.max_backoff_milliseconds {
            return Err(BACKOFF_RANGE_CONFLICT.to_string());
        }

        Ok(())
    }

    fn build_mode(&self) -> RunMode {
        match &self.command {
            Command::List(list_args) => RunMode::List {
                output: list_args.output.clone(),
                format: list_args.format,
            },
            Command::Send(SendArgs {
                listing_file: Some(listing_file),
                ..
            }) => RunMode::Send(SendInput::ListingFile(listing_file.clone())),
            Command::Send(SendArgs { key, .. }) => {
                RunMode::Send(SendInput::Key(key.clone().unwrap_or_default()))
            }
            Command::Sync(_) => RunMode::Sync,
        }
    }

    fn time_window_args(&self) -> Option<&TimeWindowArgs> {
        match &self.command {
            Command::List(list_args) => Some(&list_args.time_window),
            Command::Sync(time_window_args) => Some(time_window_args),
            Command::Send(_) => None,
        }
    }

    // --time-window wins over the location file, which wins over the default.
    fn build_listing_config(&self, file_time_window: Option<&str>) -> Result<ListingConfig, String> {
        let cli_time_window = self.time_window_args().and_then(|args| args.time_window);
        let time_window = match (cli_time_window, file_time_window) {
            (Some(time_window), _) => time_window,
            (None, Some(time_window)) => duration::parse_time_window(time_window)
                .map_err(|e| format!("time_window in the location file: {e}\n"))?,
            (None, None) => duration::parse_time_window(DEFAULT_TIME_WINDOW)?,
        };

        Ok(ListingConfig {
            time_window,
            backfill: self.time_window_args().is_some_and(|args| args.backfill),
            max_keys: self.max_keys,
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        self.verbosity
            .log_level()
            .map(|log_level| TracingConfig {
                tracing_level: log_level,
                json_tracing: self.json_tracing,
                aws_sdk_tracing: self.aws_sdk_tracing,
                span_events_tracing: self.span_events_tracing,
                disable_color_tracing: self.disable_color_tracing,
            })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        value.validate_config()?;

        let config_file = value
            .config_file
            .clone()
            .ok_or_else(|| "--config-file or S3RELAY_CONFIG_FILE is required\n".to_string())?;
        let locations_file = LocationsFile::load(&config_file)?;
        let listing_config = value.build_listing_config(locations_file.time_window.as_deref())?;
        let (source, destinations) = locations_file.into_locations()?;

        Ok(Config {
            source,
            destinations,
            listing_config,
            retry_config: RetryConfig {
                max_attempts: value.max_attempts,
                initial_backoff_milliseconds: value.initial_backoff_milliseconds,
                max_backoff_milliseconds: value.max_backoff_milliseconds,
                aws_max_attempts: value.aws_max_attempts,
            },
            timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: value.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: value
                    .operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: Some(value.connect_timeout_milliseconds),
                read_timeout_milliseconds: Some(value.read_timeout_milliseconds),
            },
            transfer_config: TransferConfig {
                multipart_chunksize: value.multipart_chunksize,
                server_side_copy: !value.disable_server_side_copy,
                copy_attempt_timeout_milliseconds: value.copy_attempt_timeout_milliseconds,
            },
            tracing_config: value.build_tracing_config(),
            worker_size: value.worker_size,
            mode: value.build_mode(),
            summary_file: value.summary_file.clone(),
        })
    }
}
