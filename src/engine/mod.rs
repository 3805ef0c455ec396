//! Encrypted-item engines.
//!
//! An engine applies a `CryptoConfig` to a whole item: it encrypts and signs
//! attributes according to their actions and reverses that on decrypt.

mod local;

pub use local::LocalItemEngine;

use crate::config::CryptoConfig;
use crate::conversions::Item;
use crate::errors::Result;

/// Reserved attribute holding the item signature.
pub const SIGNATURE_ATTRIBUTE: &str = "*amzn-ddb-map-sig*";

/// Reserved attribute describing the algorithms used on the item.
pub const MATERIAL_DESCRIPTION_ATTRIBUTE: &str = "*amzn-ddb-map-desc*";

pub trait ItemEngine: Send + Sync {
    fn encrypt_item(&self, item: Item, config: &CryptoConfig) -> Result<Item>;

    fn decrypt_item(&self, item: Item, config: &CryptoConfig) -> Result<Item>;
}
