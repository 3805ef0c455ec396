//! KMS client backed by `aws-sdk-kms`.

use crate::client::{AwsConfig, build_kms_client, shared_runtime};
use crate::errors::Result;
use crate::kms::operations::{sync_decrypt, sync_generate_data_key};
use crate::kms::{DataKey, DataKeySpec, KeyEncryptionAlgorithm, KeyManagementService};
use aws_sdk_kms::Client;
use std::sync::Arc;
use tokio::runtime::Runtime;
use zeroize::Zeroizing;

/// Sync KMS handle driving the SDK on the shared runtime.
#[derive(Clone)]
pub struct KmsClient {
    client: Client,
    runtime: Arc<Runtime>,
}

impl KmsClient {
    /// Create a KMS client from connection options.
    pub fn new(config: &AwsConfig) -> Result<Self> {
        let runtime = shared_runtime()?;
        let client = runtime.block_on(build_kms_client(config))?;
        Ok(Self { client, runtime })
    }

    /// Wrap an already configured SDK client.
    pub fn from_client(client: Client, runtime: Arc<Runtime>) -> Self {
        Self { client, runtime }
    }
}

impl KeyManagementService for KmsClient {
    fn generate_data_key(&self, key_id: &str, spec: DataKeySpec) -> Result<DataKey> {
        sync_generate_data_key(&self.client, &self.runtime, key_id, spec)
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        key_id: &str,
        algorithm: KeyEncryptionAlgorithm,
    ) -> Result<Zeroizing<Vec<u8>>> {
        sync_decrypt(&self.client, &self.runtime, key_id, ciphertext, algorithm)
    }
}
