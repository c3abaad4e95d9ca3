//! The YAML file naming the source and destination locations of a run.
//!
//! ```yaml
//! time_window: 12h
//! source:
//!   name: landing
//!   base_path: landing-bucket/incoming
//!   formatter: "{date}/{name}"
//! destinations:
//!   - name: archive
//!     base_path: s3://archive-bucket/raw
//!     endpoint_url: https://s3.example.com
//!     aws_access_key_id: AKIA...
//!     aws_secret_access_key: ...
//!     formatter: "dt={date}/{name}"
//!     unpack: true
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::config::LocationConfig;
use crate::config::args::value_parser::url;
use crate::formatter::FormatTemplate;
use crate::types::{AccessKeys, BasePath, S3Credentials};

const NO_DESTINATION: &str = "at least one destination is required\n";
const UNPACK_ON_SOURCE: &str = "unpack can only be set on a destination\n";
const INCOMPLETE_CREDENTIALS: &str =
    "aws_access_key_id and aws_secret_access_key must be given together\n";
const DUPLICATE_DESTINATION_NAME: &str = "destination names must be unique\n";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationsFile {
    #[serde(default)]
    pub time_window: Option<String>,
    pub source: LocationEntry,
    pub destinations: Vec<LocationEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationEntry {
    pub name: String,
    pub base_path: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(default)]
    pub unpack: bool,
}

impl LocationsFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}\n", path.display()))?;

        Self::from_yaml(&text).map_err(|e| format!("{}: {e}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self, String> {
        serde_yaml::from_str(text).map_err(|e| format!("invalid location file: {e}\n"))
    }

    /// Validates every entry and compiles its template.
    pub fn into_locations(self) -> Result<(LocationConfig, Vec<LocationConfig>), String> {
        if self.source.unpack {
            return Err(UNPACK_ON_SOURCE.to_string());
        }
        if self.destinations.is_empty() {
            return Err(NO_DESTINATION.to_string());
        }

        let mut names = HashSet::new();
        if !self
            .destinations
            .iter()
            .all(|destination| names.insert(destination.name.as_str()))
        {
            return Err(DUPLICATE_DESTINATION_NAME.to_string());
        }

        let source = self.source.into_location_config()?;
        let destinations = self
            .destinations
            .into_iter()
            .map(LocationEntry::into_location_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((source, destinations))
    }
}

impl LocationEntry {
    fn into_location_config(self) -> Result<LocationConfig, String> {
        let location_error = |e: String| format!("location '{}': {}", self.name, e);

        let base_path: BasePath = self.base_path.parse().map_err(location_error)?;

        let endpoint_url = self
            .endpoint_url
            .as_deref()
            .map(url::check_scheme)
            .transpose()
            .map_err(location_error)?;

        let formatter = self
            .formatter
            .as_deref()
            .map(FormatTemplate::compile)
            .transpose()
            .map_err(|e| location_error(e.to_string()))?;

        let credential = match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(access_key), Some(secret_access_key)) => S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: secret_access_key.clone(),
                    session_token: self.aws_session_token.clone(),
                },
            },
            (None, None) => S3Credentials::FromEnvironment,
            _ => return Err(location_error(INCOMPLETE_CREDENTIALS.to_string())),
        };

        Ok(LocationConfig {
            name: self.name.clone(),
            credential,
            region: self.region.clone(),
            endpoint_url,
            force_path_style: self.force_path_style,
            base_path,
            formatter,
            unpack: self.unpack,
        })
    }
}
