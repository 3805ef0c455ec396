//! Crypto configuration assembly.
//!
//! A `CryptoConfig` bundles the keys, the encryption context and the
//! attribute actions an item engine needs for one encrypt or decrypt call.
//! It is rebuilt on every call and dropped right after.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

use crate::POINTER_ATTRIBUTE;
use crate::conversions::{Item, to_decimal};
use crate::errors::Result;
use crate::table_operations::TableInfo;

/// Whether the key bytes are a symmetric secret or an asymmetric key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionKeyType {
    #[default]
    Symmetric,
    Asymmetric,
}

/// How the key bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    #[default]
    Raw,
    Der,
}

/// Algorithm a delegated key is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Aes,
    HmacSha512,
    Rsa,
    Sha512WithRsa,
}

impl KeyAlgorithm {
    /// JCE-style algorithm name.
    pub fn name(self) -> &'static str {
        match self {
            KeyAlgorithm::Aes => "AES",
            KeyAlgorithm::HmacSha512 => "HmacSHA512",
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Sha512WithRsa => "SHA512withRSA",
        }
    }

    /// Wrapping and signing algorithm for a key type.
    pub fn for_key_type(key_type: EncryptionKeyType) -> (KeyAlgorithm, KeyAlgorithm) {
        match key_type {
            EncryptionKeyType::Symmetric => (KeyAlgorithm::Aes, KeyAlgorithm::HmacSha512),
            EncryptionKeyType::Asymmetric => (KeyAlgorithm::Rsa, KeyAlgorithm::Sha512WithRsa),
        }
    }
}

/// Key bytes bound to one algorithm. Wiped on drop.
pub struct DelegatedKey {
    algorithm: KeyAlgorithm,
    key_type: EncryptionKeyType,
    encoding: KeyEncoding,
    key: Zeroizing<Vec<u8>>,
}

impl DelegatedKey {
    pub fn new(
        key: &[u8],
        algorithm: KeyAlgorithm,
        key_type: EncryptionKeyType,
        encoding: KeyEncoding,
    ) -> Self {
        Self {
            algorithm,
            key_type,
            encoding,
            key: Zeroizing::new(key.to_vec()),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn key_type(&self) -> EncryptionKeyType {
        self.key_type
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for DelegatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedKey")
            .field("algorithm", &self.algorithm.name())
            .field("key_type", &self.key_type)
            .field("encoding", &self.encoding)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Wrapping, unwrapping and signing keys for one item.
#[derive(Debug)]
pub struct WrappedMaterialsProvider {
    pub wrapping_key: DelegatedKey,
    pub unwrapping_key: DelegatedKey,
    pub signing_key: DelegatedKey,
}

/// Non-secret metadata bound to every ciphertext of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionContext {
    pub table_name: String,
    pub partition_key_name: String,
    pub sort_key_name: Option<String>,
    /// Extra authenticated attributes supplied by the caller.
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CryptoAction {
    /// Left untouched and unsigned.
    DoNothing,
    /// Stored in plaintext but covered by the signature.
    SignOnly,
    EncryptAndSign,
}

/// Default action plus per-attribute overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeActions {
    pub default_action: CryptoAction,
    pub attribute_actions: HashMap<String, CryptoAction>,
}

impl AttributeActions {
    pub fn new(default_action: CryptoAction) -> Self {
        Self {
            default_action,
            attribute_actions: HashMap::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>, action: CryptoAction) -> Self {
        self.attribute_actions.insert(name.into(), action);
        self
    }

    /// Action for an attribute.
    pub fn action(&self, name: &str) -> CryptoAction {
        self.attribute_actions
            .get(name)
            .copied()
            .unwrap_or(self.default_action)
    }

    /// Make sure no key attribute is encrypted.
    ///
    /// Keys that would be encrypted are downgraded to `SignOnly`; keys
    /// already set to `DoNothing` stay that way.
    pub fn set_index_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if self.action(key) == CryptoAction::EncryptAndSign {
                self.attribute_actions
                    .insert(key.to_string(), CryptoAction::SignOnly);
            }
        }
    }
}

/// Everything an item engine needs for one call.
#[derive(Debug)]
pub struct CryptoConfig {
    pub materials_provider: WrappedMaterialsProvider,
    pub encryption_context: EncryptionContext,
    pub attribute_actions: AttributeActions,
}

/// Key type and encoding of the data key handed to `build_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySettings {
    pub key_type: EncryptionKeyType,
    pub encoding: KeyEncoding,
}

/// Assemble the crypto configuration for one item.
///
/// `pointer` and every name in `dont_encrypt` resolve to `DoNothing`; the
/// table's key attributes are never encrypted; everything else is
/// encrypted and signed.
pub fn build_config(
    table_info: &TableInfo,
    key_bytes: &[u8],
    context_attributes: Option<&Map<String, Value>>,
    dont_encrypt: Option<&[&str]>,
    settings: KeySettings,
) -> Result<CryptoConfig> {
    let (wrap_algorithm, sign_algorithm) = KeyAlgorithm::for_key_type(settings.key_type);
    let wrap = |algorithm| {
        DelegatedKey::new(key_bytes, algorithm, settings.key_type, settings.encoding)
    };

    let materials_provider = WrappedMaterialsProvider {
        wrapping_key: wrap(wrap_algorithm),
        unwrapping_key: wrap(wrap_algorithm),
        signing_key: wrap(sign_algorithm),
    };

    let attributes = match context_attributes {
        Some(attrs) if !attrs.is_empty() => Some(to_decimal(attrs)?),
        _ => None,
    };
    let encryption_context = EncryptionContext {
        table_name: table_info.name.clone(),
        partition_key_name: table_info.primary_index.partition.clone(),
        sort_key_name: table_info.primary_index.sort.clone(),
        attributes,
    };

    let mut attribute_actions = AttributeActions::new(CryptoAction::EncryptAndSign);
    let excluded = dont_encrypt.unwrap_or_default().iter().copied();
    for name in std::iter::once(POINTER_ATTRIBUTE).chain(excluded) {
        attribute_actions
            .attribute_actions
            .insert(name.to_string(), CryptoAction::DoNothing);
    }
    attribute_actions.set_index_keys(table_info.protected_index_keys());

    Ok(CryptoConfig {
        materials_provider,
        encryption_context,
        attribute_actions,
    })
}
