//! Item encryptor: the public encrypt/decrypt entry points.
//!
//! Encrypt asks KMS for a data key, stores the wrapped key on the item as
//! `pointer` and lets the item engine encrypt everything else. Decrypt
//! reverses it: unwrap `pointer` through KMS, then hand the item to the
//! engine with the recovered key.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::POINTER_ATTRIBUTE;
use crate::client::{AwsConfig, build_sdk_config, shared_runtime};
use crate::config::{KeySettings, build_config};
use crate::conversions::{Item, to_decimal, to_number};
use crate::engine::{ItemEngine, LocalItemEngine};
use crate::errors::{EncryptionError, Result};
use crate::kms::{DataKeySpec, KeyEncryptionAlgorithm, KeyManagementService, KmsClient};
use crate::table_operations::{DynamoTableClient, TableInfo, TableMetadataSource};

/// Encrypts and decrypts DynamoDB items with KMS-generated data keys.
///
/// Holds no per-item state; one instance can serve concurrent callers.
#[derive(Clone)]
pub struct ItemEncryptor {
    kms: Arc<dyn KeyManagementService>,
    tables: Arc<dyn TableMetadataSource>,
    engine: Arc<dyn ItemEngine>,
    data_key_spec: DataKeySpec,
    key_settings: KeySettings,
}

impl ItemEncryptor {
    pub fn new(
        kms: Arc<dyn KeyManagementService>,
        tables: Arc<dyn TableMetadataSource>,
        engine: Arc<dyn ItemEngine>,
    ) -> Self {
        Self {
            kms,
            tables,
            engine,
            data_key_spec: DataKeySpec::default(),
            key_settings: KeySettings::default(),
        }
    }

    /// Wire the AWS-backed KMS and DynamoDB handles with the local engine.
    pub fn connect(config: &AwsConfig) -> Result<Self> {
        let runtime = shared_runtime()?;
        let sdk_config = runtime.block_on(build_sdk_config(config))?;
        let kms = KmsClient::from_client(aws_sdk_kms::Client::new(&sdk_config), runtime.clone());
        let tables =
            DynamoTableClient::from_client(aws_sdk_dynamodb::Client::new(&sdk_config), runtime);
        Ok(Self::new(
            Arc::new(kms),
            Arc::new(tables),
            Arc::new(LocalItemEngine::new()),
        ))
    }

    /// Request a different data key size from KMS.
    pub fn with_data_key_spec(mut self, spec: DataKeySpec) -> Self {
        self.data_key_spec = spec;
        self
    }

    pub fn with_key_settings(mut self, settings: KeySettings) -> Self {
        self.key_settings = settings;
        self
    }

    /// Look up table name and index keys.
    pub fn get_table_info(&self, table_name: &str) -> Result<TableInfo> {
        self.tables.describe_table(table_name)
    }

    /// Encrypt a JSON item.
    ///
    /// Binary attributes of the result (ciphertexts, `pointer`, signature)
    /// are base64 strings.
    pub fn encrypt(
        &self,
        table_info: &TableInfo,
        key_id: &str,
        item: &Map<String, Value>,
        context_attributes: Option<&Map<String, Value>>,
        dont_encrypt: Option<&[&str]>,
    ) -> Result<Map<String, Value>> {
        let encrypted = self.encrypt_item(
            table_info,
            key_id,
            to_decimal(item)?,
            context_attributes,
            dont_encrypt,
        )?;
        to_number(encrypted)
    }

    /// Encrypt an item already in DynamoDB attribute form.
    pub fn encrypt_item(
        &self,
        table_info: &TableInfo,
        key_id: &str,
        mut item: Item,
        context_attributes: Option<&Map<String, Value>>,
        dont_encrypt: Option<&[&str]>,
    ) -> Result<Item> {
        let data_key = self.kms.generate_data_key(key_id, self.data_key_spec)?;
        debug!(table = %table_info.name, key_id = %key_id, "encrypting item");

        item.insert(
            POINTER_ATTRIBUTE.to_string(),
            AttributeValue::B(Blob::new(data_key.ciphertext.clone())),
        );

        let config = build_config(
            table_info,
            &data_key.plaintext,
            context_attributes,
            dont_encrypt,
            self.key_settings,
        )?;
        drop(data_key);

        self.engine.encrypt_item(item, &config)
    }

    /// Decrypt a JSON item produced by [`ItemEncryptor::encrypt`].
    ///
    /// Fails with [`EncryptionError::PointerNotFound`] before contacting KMS
    /// when the item has no `pointer`.
    pub fn decrypt(
        &self,
        table_info: &TableInfo,
        key_id: &str,
        item: &Map<String, Value>,
        context_attributes: Option<&Map<String, Value>>,
        dont_encrypt: Option<&[&str]>,
    ) -> Result<Map<String, Value>> {
        let decrypted = self.decrypt_item(
            table_info,
            key_id,
            to_decimal(item)?,
            context_attributes,
            dont_encrypt,
        )?;
        to_number(decrypted)
    }

    /// Decrypt an item as read from DynamoDB.
    pub fn decrypt_item(
        &self,
        table_info: &TableInfo,
        key_id: &str,
        mut item: Item,
        context_attributes: Option<&Map<String, Value>>,
        dont_encrypt: Option<&[&str]>,
    ) -> Result<Item> {
        let pointer = item
            .remove(POINTER_ATTRIBUTE)
            .map(|value| pointer_bytes(&value))
            .transpose()?
            .filter(|bytes| !bytes.is_empty())
            .ok_or(EncryptionError::PointerNotFound)?;

        debug!(table = %table_info.name, key_id = %key_id, "decrypting item");
        let key_bytes =
            self.kms
                .decrypt(&pointer, key_id, KeyEncryptionAlgorithm::SymmetricDefault)?;

        let config = build_config(
            table_info,
            &key_bytes,
            context_attributes,
            dont_encrypt,
            self.key_settings,
        )?;
        drop(key_bytes);

        self.engine.decrypt_item(item, &config)
    }
}

/// Wrapped key bytes from a `pointer` attribute.
///
/// JSON items carry it as a base64 string.
fn pointer_bytes(value: &AttributeValue) -> Result<Vec<u8>> {
    match value {
        AttributeValue::B(blob) => Ok(blob.as_ref().to_vec()),
        AttributeValue::S(encoded) => Ok(BASE64.decode(encoded)?),
        _ => Err(EncryptionError::Serialization(
            "pointer attribute must be binary".to_string(),
        )),
    }
}
