//! In-process item engine for symmetric data keys.
//!
//! Layout of an encrypted item:
//! - every `EncryptAndSign` attribute becomes `B(nonce || AES-GCM ciphertext)`
//!   of its DynamoDB-JSON encoding, bound to the encryption context and the
//!   attribute name
//! - `*amzn-ddb-map-desc*` names the content and signing algorithms
//! - `*amzn-ddb-map-sig*` is an HMAC-SHA512 over the context, the material
//!   description and every signed attribute in name order

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::config::{CryptoAction, CryptoConfig, DelegatedKey, EncryptionContext, KeyAlgorithm};
use crate::conversions::{Item, attribute_value_to_json, from_tagged_json, to_number, to_tagged_json};
use crate::engine::{ItemEngine, MATERIAL_DESCRIPTION_ATTRIBUTE, SIGNATURE_ATTRIBUTE};
use crate::errors::{EncryptionError, Result};

type HmacSha512 = Hmac<Sha512>;

const NONCE_LEN: usize = 12;
const CONTENT_ALGORITHM_FIELD: &str = "amzn-ddb-env-alg";
const SIGNING_ALGORITHM_FIELD: &str = "amzn-ddb-sig-alg";

/// Engine that encrypts attributes locally with the config's data key.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalItemEngine;

impl LocalItemEngine {
    pub fn new() -> Self {
        Self
    }
}

enum ContentCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl ContentCipher {
    fn new(key: &DelegatedKey) -> Result<Self> {
        if key.algorithm() != KeyAlgorithm::Aes {
            return Err(EncryptionError::UnsupportedKey(format!(
                "{} wrapping keys are not supported by the local engine",
                key.algorithm().name()
            )));
        }
        let bytes = key.key_bytes();
        let invalid = |_| EncryptionError::UnsupportedKey("invalid AES key".to_string());
        match bytes.len() {
            16 => <Aes128Gcm as KeyInit>::new_from_slice(bytes)
                .map(ContentCipher::Aes128)
                .map_err(invalid),
            32 => <Aes256Gcm as KeyInit>::new_from_slice(bytes)
                .map(ContentCipher::Aes256)
                .map_err(invalid),
            n => Err(EncryptionError::UnsupportedKey(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    fn algorithm_name(&self) -> &'static str {
        match self {
            ContentCipher::Aes128(_) => "AES/128/GCM",
            ContentCipher::Aes256(_) => "AES/256/GCM",
        }
    }

    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let ciphertext = match self {
            ContentCipher::Aes128(c) => c.encrypt(&nonce, payload),
            ContentCipher::Aes256(c) => c.encrypt(&nonce, payload),
        }
        .map_err(|_| EncryptionError::Engine("attribute encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if sealed.len() < NONCE_LEN {
            return Err(EncryptionError::Engine(
                "encrypted attribute is too short".to_string(),
            ));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        match self {
            ContentCipher::Aes128(c) => c.decrypt(nonce, payload),
            ContentCipher::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map(Zeroizing::new)
        .map_err(|_| EncryptionError::Engine("attribute decryption failed".to_string()))
    }
}

fn signing_mac(key: &DelegatedKey) -> Result<HmacSha512> {
    if key.algorithm() != KeyAlgorithm::HmacSha512 {
        return Err(EncryptionError::UnsupportedKey(format!(
            "{} signing keys are not supported by the local engine",
            key.algorithm().name()
        )));
    }
    <HmacSha512 as Mac>::new_from_slice(key.key_bytes())
        .map_err(|_| EncryptionError::UnsupportedKey("invalid HMAC key".to_string()))
}

fn update_framed(mac: &mut HmacSha512, bytes: &[u8]) {
    mac.update(&(bytes.len() as u64).to_be_bytes());
    mac.update(bytes);
}

/// Feed context, description and signed attributes into the MAC.
fn feed_signature(
    mac: &mut HmacSha512,
    context: &[u8],
    description: &[u8],
    signed: &BTreeMap<String, (CryptoAction, Vec<u8>)>,
) {
    update_framed(mac, context);
    update_framed(mac, description);
    for (name, (action, bytes)) in signed {
        update_framed(mac, name.as_bytes());
        mac.update(match action {
            CryptoAction::EncryptAndSign => b"E",
            _ => b"S",
        });
        update_framed(mac, bytes);
    }
}

/// Canonical bytes of the encryption context.
fn context_bytes(context: &EncryptionContext) -> Result<Vec<u8>> {
    let mut object = Map::new();
    object.insert("table".to_string(), Value::String(context.table_name.clone()));
    object.insert(
        "partition_key".to_string(),
        Value::String(context.partition_key_name.clone()),
    );
    if let Some(sort) = &context.sort_key_name {
        object.insert("sort_key".to_string(), Value::String(sort.clone()));
    }
    if let Some(attributes) = &context.attributes {
        object.insert(
            "attributes".to_string(),
            Value::Object(to_number(attributes.clone())?),
        );
    }
    canonical_bytes(&Value::Object(object))
}

/// JSON encoding with object keys sorted at every level.
///
/// `serde_json::Map` keeps insertion order when `preserve_order` is enabled
/// anywhere in the build, so signed bytes never rely on its iteration order.
fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push(b'{');
            for (i, (key, inner)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(inner, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, inner) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(inner, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

fn attribute_aad(context: &[u8], name: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(context.len() + 1 + name.len());
    aad.extend_from_slice(context);
    aad.push(0);
    aad.extend_from_slice(name.as_bytes());
    aad
}

/// Canonical bytes of a plaintext signed attribute.
///
/// Uses the native JSON form so the signature still matches after the item
/// went through `to_number`/`to_decimal`.
fn plain_signing_bytes(value: &AttributeValue) -> Result<Vec<u8>> {
    canonical_bytes(&attribute_value_to_json(value.clone())?)
}

/// Binary payload of an attribute, accepting base64 strings from JSON items.
fn binary_value(name: &str, value: &AttributeValue) -> Result<Vec<u8>> {
    match value {
        AttributeValue::B(blob) => Ok(blob.as_ref().to_vec()),
        AttributeValue::S(encoded) => Ok(BASE64.decode(encoded)?),
        _ => Err(EncryptionError::Engine(format!(
            "attribute '{}' should hold binary ciphertext",
            name
        ))),
    }
}

fn material_description(cipher: &ContentCipher, signing: &DelegatedKey) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        (
            CONTENT_ALGORITHM_FIELD.to_string(),
            AttributeValue::S(cipher.algorithm_name().to_string()),
        ),
        (
            SIGNING_ALGORITHM_FIELD.to_string(),
            AttributeValue::S(signing.algorithm().name().to_string()),
        ),
    ]))
}

impl ItemEngine for LocalItemEngine {
    fn encrypt_item(&self, item: Item, config: &CryptoConfig) -> Result<Item> {
        for reserved in [SIGNATURE_ATTRIBUTE, MATERIAL_DESCRIPTION_ATTRIBUTE] {
            if item.contains_key(reserved) {
                return Err(EncryptionError::Engine(format!(
                    "item already contains reserved attribute '{}'",
                    reserved
                )));
            }
        }

        let materials = &config.materials_provider;
        let cipher = ContentCipher::new(&materials.wrapping_key)?;
        let mut mac = signing_mac(&materials.signing_key)?;
        let context = context_bytes(&config.encryption_context)?;
        let description = material_description(&cipher, &materials.signing_key);

        let mut signed = BTreeMap::new();
        let mut output = Item::with_capacity(item.len() + 2);
        for (name, value) in item {
            match config.attribute_actions.action(&name) {
                CryptoAction::DoNothing => {}
                CryptoAction::SignOnly => {
                    signed.insert(name.clone(), (CryptoAction::SignOnly, plain_signing_bytes(&value)?));
                }
                CryptoAction::EncryptAndSign => {
                    trace!(attribute = %name, "encrypting attribute");
                    let plaintext = Zeroizing::new(serde_json::to_vec(&to_tagged_json(&value)?)?);
                    let sealed = cipher.seal(&plaintext, &attribute_aad(&context, &name))?;
                    signed.insert(name.clone(), (CryptoAction::EncryptAndSign, sealed.clone()));
                    output.insert(name, AttributeValue::B(Blob::new(sealed)));
                    continue;
                }
            }
            output.insert(name, value);
        }

        feed_signature(&mut mac, &context, &plain_signing_bytes(&description)?, &signed);
        let signature = mac.finalize().into_bytes().to_vec();

        debug!(
            table = %config.encryption_context.table_name,
            signed = signed.len(),
            encrypted = signed
                .values()
                .filter(|(action, _)| *action == CryptoAction::EncryptAndSign)
                .count(),
            "encrypted item"
        );

        output.insert(MATERIAL_DESCRIPTION_ATTRIBUTE.to_string(), description);
        output.insert(
            SIGNATURE_ATTRIBUTE.to_string(),
            AttributeValue::B(Blob::new(signature)),
        );
        Ok(output)
    }

    fn decrypt_item(&self, mut item: Item, config: &CryptoConfig) -> Result<Item> {
        let signature = item.remove(SIGNATURE_ATTRIBUTE).ok_or_else(|| {
            EncryptionError::Engine("item has no signature attribute".to_string())
        })?;
        let signature = binary_value(SIGNATURE_ATTRIBUTE, &signature)?;
        let stored_description = item.remove(MATERIAL_DESCRIPTION_ATTRIBUTE).ok_or_else(|| {
            EncryptionError::Engine("item has no material description attribute".to_string())
        })?;

        let materials = &config.materials_provider;
        let cipher = ContentCipher::new(&materials.unwrapping_key)?;
        let mut mac = signing_mac(&materials.signing_key)?;
        let context = context_bytes(&config.encryption_context)?;

        let description = plain_signing_bytes(&material_description(&cipher, &materials.signing_key))?;
        if plain_signing_bytes(&stored_description)? != description {
            return Err(EncryptionError::Engine(
                "material description does not match the configured keys".to_string(),
            ));
        }

        let mut signed = BTreeMap::new();
        for (name, value) in &item {
            match config.attribute_actions.action(name) {
                CryptoAction::DoNothing => {}
                CryptoAction::SignOnly => {
                    signed.insert(name.clone(), (CryptoAction::SignOnly, plain_signing_bytes(value)?));
                }
                CryptoAction::EncryptAndSign => {
                    signed.insert(
                        name.clone(),
                        (CryptoAction::EncryptAndSign, binary_value(name, value)?),
                    );
                }
            }
        }

        feed_signature(&mut mac, &context, &description, &signed);
        if mac.verify_slice(&signature).is_err() {
            warn!(
                table = %config.encryption_context.table_name,
                "item signature verification failed"
            );
            return Err(EncryptionError::SignatureMismatch);
        }

        let mut output = Item::with_capacity(item.len());
        for (name, value) in item {
            let value = match signed.remove(&name) {
                Some((CryptoAction::EncryptAndSign, sealed)) => {
                    trace!(attribute = %name, "decrypting attribute");
                    let plaintext = cipher.open(&sealed, &attribute_aad(&context, &name))?;
                    from_tagged_json(&serde_json::from_slice(&plaintext)?)?
                }
                _ => value,
            };
            output.insert(name, value);
        }

        debug!(
            table = %config.encryption_context.table_name,
            attributes = output.len(),
            "decrypted item"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncryptionKeyType, KeySettings, build_config};
    use crate::conversions::{to_decimal, to_number};
    use crate::table_operations::{TableIndex, TableInfo};
    use serde_json::json;

    fn table() -> TableInfo {
        TableInfo::new("orders", TableIndex::new("id", None))
    }

    fn config(key: &[u8]) -> CryptoConfig {
        build_config(&table(), key, None, Some(&["notes"][..]), KeySettings::default()).unwrap()
    }

    fn item() -> Item {
        to_decimal(
            json!({"id": "1", "amount": 10.5, "tags": ["a", "b"], "notes": "plain"})
                .as_object()
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn round_trip_restores_item() {
        let engine = LocalItemEngine::new();
        let encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();

        assert!(matches!(encrypted["amount"], AttributeValue::B(_)));
        assert!(matches!(encrypted["tags"], AttributeValue::B(_)));
        assert_eq!(encrypted["id"], AttributeValue::S("1".to_string()));
        assert_eq!(encrypted["notes"], AttributeValue::S("plain".to_string()));
        assert!(encrypted.contains_key(SIGNATURE_ATTRIBUTE));
        assert!(encrypted.contains_key(MATERIAL_DESCRIPTION_ATTRIBUTE));

        let decrypted = engine.decrypt_item(encrypted, &config(&[3; 32])).unwrap();
        assert_eq!(decrypted, item());
    }

    #[test]
    fn aes_128_keys_work() {
        let engine = LocalItemEngine::new();
        let encrypted = engine.encrypt_item(item(), &config(&[5; 16])).unwrap();
        let decrypted = engine.decrypt_item(encrypted, &config(&[5; 16])).unwrap();
        assert_eq!(decrypted, item());
    }

    #[test]
    fn json_round_trip_still_verifies() {
        let engine = LocalItemEngine::new();
        let encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();

        let as_json = to_number(encrypted).unwrap();
        let back = to_decimal(&as_json).unwrap();
        let decrypted = engine.decrypt_item(back, &config(&[3; 32])).unwrap();
        assert_eq!(to_number(decrypted).unwrap(), to_number(item()).unwrap());
    }

    #[test]
    fn wrong_key_fails_signature() {
        let engine = LocalItemEngine::new();
        let encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();
        assert!(matches!(
            engine.decrypt_item(encrypted, &config(&[4; 32])),
            Err(EncryptionError::SignatureMismatch)
        ));
    }

    #[test]
    fn tampered_signed_attribute_is_detected() {
        let engine = LocalItemEngine::new();
        let mut encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();
        encrypted.insert("id".to_string(), AttributeValue::S("2".to_string()));
        assert!(matches!(
            engine.decrypt_item(encrypted, &config(&[3; 32])),
            Err(EncryptionError::SignatureMismatch)
        ));
    }

    #[test]
    fn dropped_encrypted_attribute_is_detected() {
        let engine = LocalItemEngine::new();
        let mut encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();
        encrypted.remove("amount");
        assert!(matches!(
            engine.decrypt_item(encrypted, &config(&[3; 32])),
            Err(EncryptionError::SignatureMismatch)
        ));
    }

    #[test]
    fn unsigned_attributes_may_change() {
        let engine = LocalItemEngine::new();
        let mut encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();
        encrypted.insert("notes".to_string(), AttributeValue::S("edited".to_string()));
        let decrypted = engine.decrypt_item(encrypted, &config(&[3; 32])).unwrap();
        assert_eq!(decrypted["notes"], AttributeValue::S("edited".to_string()));
    }

    #[test]
    fn context_is_bound_to_ciphertext() {
        let engine = LocalItemEngine::new();
        let encrypted = engine.encrypt_item(item(), &config(&[3; 32])).unwrap();

        let other_table = TableInfo::new("invoices", TableIndex::new("id", None));
        let other =
            build_config(&other_table, &[3; 32], None, Some(&["notes"][..]), KeySettings::default())
                .unwrap();
        assert!(matches!(
            engine.decrypt_item(encrypted, &other),
            Err(EncryptionError::SignatureMismatch)
        ));
    }

    #[test]
    fn asymmetric_keys_are_unsupported() {
        let settings = KeySettings {
            key_type: EncryptionKeyType::Asymmetric,
            ..KeySettings::default()
        };
        let config = build_config(&table(), &[3; 32], None, None, settings).unwrap();
        assert!(matches!(
            LocalItemEngine::new().encrypt_item(item(), &config),
            Err(EncryptionError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn odd_key_length_is_unsupported() {
        assert!(matches!(
            LocalItemEngine::new().encrypt_item(item(), &config(&[3; 20])),
            Err(EncryptionError::UnsupportedKey(_))
        ));
    }

    #[test]
    fn missing_signature_is_an_engine_error() {
        assert!(matches!(
            LocalItemEngine::new().decrypt_item(item(), &config(&[3; 32])),
            Err(EncryptionError::Engine(_))
        ));
    }

    #[test]
    fn canonical_bytes_sort_keys_at_every_level() {
        let mut inner = Map::new();
        inner.insert("b".to_string(), json!(2));
        inner.insert("a".to_string(), json!(1));
        let mut listed = Map::new();
        listed.insert("y".to_string(), Value::Null);
        listed.insert("x".to_string(), json!(true));
        let mut outer = Map::new();
        outer.insert("zeta".to_string(), Value::Array(vec![Value::Object(listed)]));
        outer.insert("alpha".to_string(), Value::Object(inner));

        assert_eq!(
            canonical_bytes(&Value::Object(outer)).unwrap(),
            br#"{"alpha":{"a":1,"b":2},"zeta":[{"x":true,"y":null}]}"#.to_vec()
        );
    }

    #[test]
    fn map_attributes_sign_the_same_in_any_order() {
        let names: Vec<String> = (0..16).map(|i| format!("k{:02}", i)).collect();
        let forward: HashMap<_, _> = names
            .iter()
            .map(|k| (k.clone(), AttributeValue::S(k.clone())))
            .collect();
        let backward: HashMap<_, _> = names
            .iter()
            .rev()
            .map(|k| (k.clone(), AttributeValue::S(k.clone())))
            .collect();

        let a = plain_signing_bytes(&AttributeValue::M(forward)).unwrap();
        let b = plain_signing_bytes(&AttributeValue::M(backward)).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with(br#"{"k00":"k00","k01""#));
    }

    #[test]
    fn multi_attribute_context_round_trips_repeatedly() {
        let context = json!({"tenant": "acme", "region": "eu", "tier": 3, "env": "prod"});
        let context = context.as_object().unwrap();
        let engine = LocalItemEngine::new();
        let config = || {
            build_config(&table(), &[3; 32], Some(context), None, KeySettings::default()).unwrap()
        };

        for _ in 0..25 {
            let encrypted = engine.encrypt_item(item(), &config()).unwrap();
            let decrypted = engine.decrypt_item(encrypted, &config()).unwrap();
            assert_eq!(decrypted, item());
        }
    }

    #[test]
    fn reserved_attributes_are_rejected_on_encrypt() {
        let mut plain = item();
        plain.insert(
            SIGNATURE_ATTRIBUTE.to_string(),
            AttributeValue::S("forged".to_string()),
        );
        assert!(matches!(
            LocalItemEngine::new().encrypt_item(plain, &config(&[3; 32])),
            Err(EncryptionError::Engine(_))
        ));
    }
}
