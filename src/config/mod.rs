use std::path::PathBuf;

use chrono::TimeDelta;

use crate::formatter::FormatTemplate;
use crate::pipeline::listing_file::ListingFormat;
use crate::types::{BasePath, S3Credentials};

pub mod args;
pub mod file;

pub const DEFAULT_WORKER_SIZE: u16 = 16;
pub const DEFAULT_MAX_KEYS: i32 = 1000;
pub const DEFAULT_TIME_WINDOW: &str = "1d";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MILLISECONDS: u64 = 20_000;
pub const DEFAULT_CONNECT_TIMEOUT_MILLISECONDS: u64 = 10_000;
pub const DEFAULT_READ_TIMEOUT_MILLISECONDS: u64 = 60_000;
pub const DEFAULT_MULTIPART_CHUNKSIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub source: LocationConfig,
    pub destinations: Vec<LocationConfig>,
    pub listing_config: ListingConfig,
    pub retry_config: RetryConfig,
    pub timeout_config: CLITimeoutConfig,
    pub transfer_config: TransferConfig,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub mode: RunMode,
    pub summary_file: Option<PathBuf>,
}

impl Config {
    /// A configuration with default tuning for the given locations.
    pub fn new(source: LocationConfig, destinations: Vec<LocationConfig>) -> Self {
        Config {
            source,
            destinations,
            listing_config: ListingConfig::default(),
            retry_config: RetryConfig::default(),
            timeout_config: CLITimeoutConfig::default(),
            transfer_config: TransferConfig::default(),
            tracing_config: None,
            worker_size: DEFAULT_WORKER_SIZE,
            mode: RunMode::Sync,
            summary_file: None,
        }
    }

    pub fn client_config(&self, location: &LocationConfig) -> ClientConfig {
        ClientConfig {
            credential: location.credential.clone(),
            region: location.region.clone(),
            endpoint_url: location.endpoint_url.clone(),
            force_path_style: location.force_path_style,
            aws_max_attempts: self.retry_config.aws_max_attempts,
            cli_timeout_config: self.timeout_config.clone(),
        }
    }
}

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Write eligible source records to `output`, or stdout.
    List {
        output: Option<PathBuf>,
        format: ListingFormat,
    },
    Send(SendInput),
    /// List and transfer in one process.
    Sync,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendInput {
    ListingFile(PathBuf),
    Key(String),
}

/// One bucket location. Built once per run and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationConfig {
    pub name: String,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub base_path: BasePath,
    pub formatter: Option<FormatTemplate>,
    pub unpack: bool,
}

impl LocationConfig {
    pub fn new(name: &str, base_path: BasePath) -> Self {
        LocationConfig {
            name: name.to_string(),
            credential: S3Credentials::FromEnvironment,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            base_path,
            formatter: None,
            unpack: false,
        }
    }

    /// Same endpoint and credentials, so the destination can read the source directly.
    pub fn is_same_service(&self, other: &LocationConfig) -> bool {
        self.endpoint_url == other.endpoint_url
            && self.region == other.region
            && self.credential == other.credential
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub aws_max_attempts: u32,
    pub cli_timeout_config: CLITimeoutConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListingConfig {
    pub time_window: TimeDelta,
    pub backfill: bool,
    pub max_keys: i32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        ListingConfig {
            time_window: TimeDelta::days(1),
            backfill: false,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
    pub max_backoff_milliseconds: u64,
    pub aws_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_milliseconds: DEFAULT_INITIAL_BACKOFF_MILLISECONDS,
            max_backoff_milliseconds: DEFAULT_MAX_BACKOFF_MILLISECONDS,
            aws_max_attempts: DEFAULT_AWS_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

impl Default for CLITimeoutConfig {
    fn default() -> Self {
        CLITimeoutConfig {
            operation_timeout_milliseconds: None,
            operation_attempt_timeout_milliseconds: None,
            connect_timeout_milliseconds: Some(DEFAULT_CONNECT_TIMEOUT_MILLISECONDS),
            read_timeout_milliseconds: Some(DEFAULT_READ_TIMEOUT_MILLISECONDS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferConfig {
    pub multipart_chunksize: u64,
    pub server_side_copy: bool,
    pub copy_attempt_timeout_milliseconds: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            multipart_chunksize: DEFAULT_MULTIPART_CHUNKSIZE,
            server_side_copy: true,
            copy_attempt_timeout_milliseconds: None,
        }
    }
}
