//! KMS GenerateDataKey/Decrypt operations.

use crate::errors::{EncryptionError, Result, map_kms_error};
use crate::kms::{DataKey, DataKeySpec, KeyEncryptionAlgorithm};
use aws_sdk_kms::Client;
use aws_sdk_kms::primitives::Blob;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;
use zeroize::Zeroizing;

// ========== CORE ASYNC OPERATIONS ==========

/// Core async GenerateDataKey operation.
pub async fn execute_generate_data_key(
    client: Client,
    key_id: String,
    spec: DataKeySpec,
) -> Result<DataKey> {
    let output = client
        .generate_data_key()
        .key_id(&key_id)
        .key_spec(spec.to_sdk())
        .send()
        .await
        .map_err(map_kms_error)?;

    let plaintext = output
        .plaintext()
        .ok_or_else(|| EncryptionError::Kms("No plaintext key returned from KMS".to_string()))?;
    let ciphertext = output
        .ciphertext_blob()
        .ok_or_else(|| EncryptionError::Kms("No ciphertext blob returned from KMS".to_string()))?;

    debug!(key_id = %key_id, pointer_len = ciphertext.as_ref().len(), "generated data key");

    Ok(DataKey {
        plaintext: Zeroizing::new(plaintext.as_ref().to_vec()),
        ciphertext: ciphertext.as_ref().to_vec(),
    })
}

/// Core async Decrypt operation.
pub async fn execute_decrypt(
    client: Client,
    key_id: String,
    ciphertext: Vec<u8>,
    algorithm: KeyEncryptionAlgorithm,
) -> Result<Zeroizing<Vec<u8>>> {
    let output = client
        .decrypt()
        .ciphertext_blob(Blob::new(ciphertext))
        .key_id(&key_id)
        .encryption_algorithm(algorithm.to_sdk())
        .send()
        .await
        .map_err(map_kms_error)?;

    let plaintext = output
        .plaintext()
        .ok_or_else(|| EncryptionError::Kms("No plaintext returned from KMS".to_string()))?;

    debug!(key_id = %key_id, "unwrapped data key");
    Ok(Zeroizing::new(plaintext.as_ref().to_vec()))
}

// ========== SYNC WRAPPERS ==========

/// Sync GenerateDataKey.
pub fn sync_generate_data_key(
    client: &Client,
    runtime: &Arc<Runtime>,
    key_id: &str,
    spec: DataKeySpec,
) -> Result<DataKey> {
    runtime.block_on(execute_generate_data_key(
        client.clone(),
        key_id.to_string(),
        spec,
    ))
}

/// Sync Decrypt.
pub fn sync_decrypt(
    client: &Client,
    runtime: &Arc<Runtime>,
    key_id: &str,
    ciphertext: &[u8],
    algorithm: KeyEncryptionAlgorithm,
) -> Result<Zeroizing<Vec<u8>>> {
    runtime.block_on(execute_decrypt(
        client.clone(),
        key_id.to_string(),
        ciphertext.to_vec(),
        algorithm,
    ))
}
