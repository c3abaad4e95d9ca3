use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

const S3_SCHEME: &str = "s3://";
const NO_BUCKET_NAME_SPECIFIED: &str = "bucket name must be specified.";

/// Named values extracted from a key or provided by the run context.
pub type FieldSet = HashMap<String, String>;

/// One object eligible for transfer. `relpath` is relative to the source base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub relpath: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Succeeded,
    Failed,
    RetriedThenSucceeded,
    RetriedThenFailed,
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransferStatus::Succeeded | TransferStatus::RetriedThenSucceeded
        )
    }
}

/// Coarse class of the error that ended a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    KeyParse,
    MissingField,
    Transient,
    NonTransient,
}

/// Outcome of one (record, destination) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub relpath: String,
    pub destination: String,
    pub destination_key: Option<String>,
    pub status: TransferStatus,
    pub bytes: u64,
    pub attempts: u32,
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
}

/// Bucket plus normalized prefix (empty, or ending with `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasePath {
    pub bucket: String,
    pub prefix: String,
}

impl BasePath {
    pub fn full_key(&self, relpath: &str) -> String {
        format!("{}{}", self.prefix, relpath)
    }

    pub fn relpath<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}

impl FromStr for BasePath {
    type Err = String;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let path = path.strip_prefix(S3_SCHEME).unwrap_or(path);
        let (bucket, prefix) = match path.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_start_matches('/')),
            None => (path, ""),
        };

        if bucket.is_empty() {
            return Err(NO_BUCKET_NAME_SPECIFIED.to_string());
        }

        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        Ok(BasePath {
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

impl Display for BasePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", S3_SCHEME, self.bucket, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum S3Credentials {
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
