use aws_config::meta::region::{ProvideRegion, RegionProviderChain};
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Builder;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::types::S3Credentials;
use aws_smithy_runtime_api::client::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use aws_types::SdkConfig;
use aws_types::region::Region;

// S3-compatible services usually ignore the region but the SDK requires one.
const FALLBACK_REGION: &str = "us-east-1";

impl ClientConfig {
    pub async fn create_client(&self) -> Client {
        let mut config_builder =
            Builder::from(&self.load_sdk_config().await).force_path_style(self.force_path_style);

        if let Some(timeout_config) = self.build_timeout_config() {
            config_builder = config_builder.timeout_config(timeout_config);
        }

        Client::from_conf(config_builder.build())
    }

    async fn load_sdk_config(&self) -> SdkConfig {
        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .stalled_stream_protection(StalledStreamProtectionConfig::enabled().build());
        let mut config_loader = self
            .load_config_credential(config_loader)
            .region(self.build_region_provider())
            .retry_config(self.build_retry_config());

        if let Some(endpoint_url) = &self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        };

        config_loader.load().await
    }

    fn load_config_credential(&self, mut config_loader: ConfigLoader) -> ConfigLoader {
        match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    access_keys.access_key.to_string(),
                    access_keys.secret_access_key.to_string(),
                    access_keys.session_token.clone(),
                    None,
                    "s3relay",
                );
                config_loader = config_loader.credentials_provider(credentials);
            }
            S3Credentials::FromEnvironment => {}
        }
        config_loader
    }

    fn build_region_provider(&self) -> Box<dyn ProvideRegion> {
        Box::new(
            RegionProviderChain::first_try(self.region.clone().map(Region::new))
                .or_default_provider()
                .or_else(Region::new(FALLBACK_REGION)),
        )
    }

    // Retries are driven by the transfer retry policy, so the SDK normally makes one attempt.
    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard().with_max_attempts(self.aws_max_attempts.max(1))
    }

    fn build_timeout_config(&self) -> Option<TimeoutConfig> {
        let timeouts = &self.cli_timeout_config;
        if timeouts.operation_timeout_milliseconds.is_none()
            && timeouts.operation_attempt_timeout_milliseconds.is_none()
            && timeouts.connect_timeout_milliseconds.is_none()
            && timeouts.read_timeout_milliseconds.is_none()
        {
            return None;
        }

        let mut builder = TimeoutConfig::builder();
        if let Some(operation_timeout) = timeouts.operation_timeout_milliseconds {
            builder = builder.operation_timeout(Duration::from_millis(operation_timeout));
        }
        if let Some(attempt_timeout) = timeouts.operation_attempt_timeout_milliseconds {
            builder = builder.operation_attempt_timeout(Duration::from_millis(attempt_timeout));
        }
        if let Some(connect_timeout) = timeouts.connect_timeout_milliseconds {
            builder = builder.connect_timeout(Duration::from_millis(connect_timeout));
        }
        if let Some(read_timeout) = timeouts.read_timeout_milliseconds {
            builder = builder.read_timeout(Duration::from_millis(read_timeout));
        }

        Some(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLITimeoutConfig;
    use crate::types::AccessKeys;

    fn client_config(cli_timeout_config: CLITimeoutConfig) -> ClientConfig {
        ClientConfig {
            credential: S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: "my_access_key".to_string(),
                    secret_access_key: "my_secret_access_key".to_string(),
                    session_token: Some("my_session_token".to_string()),
                },
            },
            region: Some("my-region".to_string()),
            endpoint_url: Some("https://my.endpoint.local".to_string()),
            force_path_style: true,
            aws_max_attempts: 1,
            cli_timeout_config,
        }
    }

    #[tokio::test]
    async fn create_client_from_credentials() {
        init_dummy_tracing_subscriber();

        let client = client_config(CLITimeoutConfig::default()).create_client().await;

        let retry_config = client.config().retry_config().unwrap();
        assert_eq!(retry_config.max_attempts(), 1);

        let timeout_config = client.config().timeout_config().unwrap();
        assert!(timeout_config.operation_timeout().is_none());
        assert_eq!(
            timeout_config.connect_timeout(),
            Some(Duration::from_millis(10_000))
        );
        assert_eq!(
            timeout_config.read_timeout(),
            Some(Duration::from_millis(60_000))
        );

        assert_eq!(
            client.config().region().unwrap().to_string(),
            "my-region".to_string()
        );
    }

    #[tokio::test]
    async fn create_client_with_all_timeouts() {
        init_dummy_tracing_subscriber();

        let client = client_config(CLITimeoutConfig {
            operation_timeout_milliseconds: Some(1000),
            operation_attempt_timeout_milliseconds: Some(2000),
            connect_timeout_milliseconds: Some(3000),
            read_timeout_milliseconds: Some(4000),
        })
        .create_client()
        .await;

        let timeout_config = client.config().timeout_config().unwrap();
        assert_eq!(
            timeout_config.operation_timeout(),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(
            timeout_config.operation_attempt_timeout(),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            timeout_config.connect_timeout(),
            Some(Duration::from_millis(3000))
        );
        assert_eq!(
            timeout_config.read_timeout(),
            Some(Duration::from_millis(4000))
        );
    }

    #[test]
    fn no_timeout_config_without_values() {
        init_dummy_tracing_subscriber();

        let config = client_config(CLITimeoutConfig {
            operation_timeout_milliseconds: None,
            operation_attempt_timeout_milliseconds: None,
            connect_timeout_milliseconds: None,
            read_timeout_milliseconds: None,
        });
        assert!(config.build_timeout_config().is_none());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
