//! AWS client configuration shared by the KMS and DynamoDB handles.
//!
//! Supports multiple credential sources in order of priority:
//! 1. Hardcoded credentials (access_key, secret_key, session_token)
//! 2. AWS profile from ~/.aws/credentials
//! 3. Environment variables / default credential chain
//!
//! An optional `role_arn` is assumed on top of whichever source resolved.

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::retry::RetryConfig;
use aws_config::sts::AssumeRoleProvider;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader, SdkConfig};
use aws_sdk_dynamodb::config::{Credentials, Region};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::errors::{EncryptionError, Result};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_SESSION_NAME: &str = "dynamodb-encryption";

/// Process-wide Tokio runtime used to drive the async SDK calls.
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Get (or lazily create) the shared runtime.
///
/// The sync handles call `block_on` on it, so they must not be used from
/// inside another Tokio runtime.
pub fn shared_runtime() -> Result<Arc<Runtime>> {
    RUNTIME
        .get_or_try_init(|| {
            Runtime::new().map(Arc::new).map_err(|e| {
                EncryptionError::Config(format!("Failed to create tokio runtime: {}", e))
            })
        })
        .cloned()
}

/// Connection options for the AWS service clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    pub role_arn: Option<String>,
    pub role_session_name: Option<String>,
    pub external_id: Option<String>,
    /// Custom endpoint for local testing (localstack, moto).
    pub endpoint_url: Option<String>,
    /// Seconds.
    pub connect_timeout: Option<f64>,
    /// Seconds.
    pub read_timeout: Option<f64>,
    pub max_retries: Option<u32>,
}

impl AwsConfig {
    /// Read region, profile and endpoint from the usual AWS variables.
    ///
    /// Credentials are left to the default chain.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
            profile: var("AWS_PROFILE"),
            endpoint_url: var("AWS_ENDPOINT_URL"),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(EncryptionError::Config(
                "access_key and secret_key must be set together".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if let Some(secs) = value {
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(EncryptionError::Config(format!(
                        "{} must be a positive number of seconds, got {}",
                        name, secs
                    )));
                }
            }
        }
        Ok(())
    }

    fn loader(&self) -> ConfigLoader {
        // Region priority: param > env var > default
        let region_provider = RegionProviderChain::first_try(self.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(DEFAULT_REGION);

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

        if let (Some(ak), Some(sk)) = (&self.access_key, &self.secret_key) {
            let creds = Credentials::new(
                ak,
                sk,
                self.session_token.clone(),
                None,
                "dynamodb-encryption-hardcoded",
            );
            loader = loader.credentials_provider(creds);
        } else if let Some(profile_name) = &self.profile {
            let provider = ProfileFileCredentialsProvider::builder()
                .profile_name(profile_name)
                .build();
            loader = loader.credentials_provider(provider);
        }

        if self.connect_timeout.is_some() || self.read_timeout.is_some() {
            let mut timeouts = TimeoutConfig::builder();
            if let Some(secs) = self.connect_timeout {
                timeouts = timeouts.connect_timeout(Duration::from_secs_f64(secs));
            }
            if let Some(secs) = self.read_timeout {
                timeouts = timeouts.read_timeout(Duration::from_secs_f64(secs));
            }
            loader = loader.timeout_config(timeouts.build());
        }

        if let Some(max) = self.max_retries {
            loader = loader.retry_config(RetryConfig::standard().with_max_attempts(max.max(1)));
        }

        if let Some(url) = &self.endpoint_url {
            loader = loader.endpoint_url(url);
        }

        loader
    }
}

/// Load the shared SDK config, assuming `role_arn` when set.
pub async fn build_sdk_config(config: &AwsConfig) -> Result<SdkConfig> {
    config.validate()?;

    let base = config.loader().load().await;

    let Some(role_arn) = &config.role_arn else {
        return Ok(base);
    };

    debug!(role_arn = %role_arn, "assuming role for AWS clients");
    let session_name = config
        .role_session_name
        .clone()
        .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
    let mut builder = AssumeRoleProvider::builder(role_arn)
        .session_name(session_name)
        .configure(&base);
    if let Some(external_id) = &config.external_id {
        builder = builder.external_id(external_id);
    }
    let provider = builder.build().await;

    Ok(config.loader().credentials_provider(provider).load().await)
}

/// Build a KMS client from the shared config.
pub async fn build_kms_client(config: &AwsConfig) -> Result<aws_sdk_kms::Client> {
    let sdk_config = build_sdk_config(config).await?;
    Ok(aws_sdk_kms::Client::new(&sdk_config))
}

/// Build a DynamoDB client from the shared config.
pub async fn build_dynamodb_client(config: &AwsConfig) -> Result<aws_sdk_dynamodb::Client> {
    let sdk_config = build_sdk_config(config).await?;
    Ok(aws_sdk_dynamodb::Client::new(&sdk_config))
}
