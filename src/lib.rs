//! Client-side encryption for DynamoDB items using KMS data keys.
//!
//! Every item gets its own data key from KMS. The wrapped copy of that key
//! travels with the item in the `pointer` attribute, and an item engine
//! encrypts and signs the remaining attributes with the plaintext copy.
//! Table key attributes are signed but never encrypted so they stay
//! queryable.
//!
//! ```no_run
//! use dynamodb_encryption::{AwsConfig, ItemEncryptor};
//! use serde_json::json;
//!
//! # fn main() -> dynamodb_encryption::Result<()> {
//! let encryptor = ItemEncryptor::connect(&AwsConfig::from_env())?;
//! let table = encryptor.get_table_info("orders")?;
//!
//! let item = json!({"id": "1", "amount": 10.5});
//! let encrypted = encryptor.encrypt(&table, "alias/orders", item.as_object().unwrap(), None, None)?;
//! let decrypted = encryptor.decrypt(&table, "alias/orders", &encrypted, None, None)?;
//! assert_eq!(decrypted["amount"], json!(10.5));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod conversions;
pub mod encryptor;
pub mod engine;
pub mod errors;
pub mod kms;
pub mod logging;
pub mod table_operations;

/// Attribute holding the wrapped data key of an encrypted item.
pub const POINTER_ATTRIBUTE: &str = "pointer";

pub use client::AwsConfig;
pub use config::{
    AttributeActions, CryptoAction, CryptoConfig, EncryptionContext, EncryptionKeyType,
    KeyEncoding, KeySettings, build_config,
};
pub use conversions::{Item, to_decimal, to_number};
pub use encryptor::ItemEncryptor;
pub use engine::{ItemEngine, LocalItemEngine};
pub use errors::{EncryptionError, Result};
pub use kms::{DataKey, DataKeySpec, KeyEncryptionAlgorithm, KeyManagementService, KmsClient};
pub use logging::init_logging;
pub use table_operations::{
    DynamoTableClient, IndexKind, TableIndex, TableInfo, TableMetadataSource,
};
