//! KMS data-key module.
//!
//! Every encrypt call asks KMS for a fresh data key; the wrapped copy is
//! stored on the item as `pointer` and unwrapped again on decrypt.

mod client;
mod operations;

pub use client::KmsClient;

use crate::errors::Result;
use std::fmt;
use zeroize::Zeroizing;

/// Key material requested from GenerateDataKey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataKeySpec {
    #[default]
    Aes256,
    Aes128,
}

impl DataKeySpec {
    /// Length of the plaintext key in bytes.
    pub fn key_len(self) -> usize {
        match self {
            DataKeySpec::Aes256 => 32,
            DataKeySpec::Aes128 => 16,
        }
    }

    pub(crate) fn to_sdk(self) -> aws_sdk_kms::types::DataKeySpec {
        match self {
            DataKeySpec::Aes256 => aws_sdk_kms::types::DataKeySpec::Aes256,
            DataKeySpec::Aes128 => aws_sdk_kms::types::DataKeySpec::Aes128,
        }
    }
}

/// Algorithm KMS uses to unwrap the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncryptionAlgorithm {
    #[default]
    SymmetricDefault,
}

impl KeyEncryptionAlgorithm {
    pub(crate) fn to_sdk(self) -> aws_sdk_kms::types::EncryptionAlgorithmSpec {
        match self {
            KeyEncryptionAlgorithm::SymmetricDefault => {
                aws_sdk_kms::types::EncryptionAlgorithmSpec::SymmetricDefault
            }
        }
    }
}

/// A freshly generated data key.
///
/// `plaintext` is wiped when the key is dropped.
pub struct DataKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    /// Wrapped form, stored on the item as `pointer`.
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"<redacted>")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Data-key operations of a key-management service.
///
/// Implemented by [`KmsClient`] and by in-memory fakes in tests.
pub trait KeyManagementService: Send + Sync {
    fn generate_data_key(&self, key_id: &str, spec: DataKeySpec) -> Result<DataKey>;

    fn decrypt(
        &self,
        ciphertext: &[u8],
        key_id: &str,
        algorithm: KeyEncryptionAlgorithm,
    ) -> Result<Zeroizing<Vec<u8>>>;
}
