//! In-memory stand-ins for KMS and DynamoDB.

#![allow(dead_code)]

use dynamodb_encryption::{
    DataKey, DataKeySpec, EncryptionError, IndexKind, ItemEncryptor, KeyEncryptionAlgorithm,
    KeyManagementService, LocalItemEngine, Result, TableIndex, TableInfo, TableMetadataSource,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// Fake KMS that remembers every data key it handed out.
#[derive(Default)]
pub struct FakeKms {
    keys: Mutex<HashMap<Vec<u8>, (String, Vec<u8>)>>,
    pub generate_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
}

impl FakeKms {
    pub fn generated(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn decrypted(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

impl KeyManagementService for FakeKms {
    fn generate_data_key(&self, key_id: &str, spec: DataKeySpec) -> Result<DataKey> {
        if key_id.is_empty() {
            return Err(EncryptionError::Kms(
                "KMS key not found. Check the key ID or alias.".to_string(),
            ));
        }
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let plaintext: Vec<u8> = (0..spec.key_len()).map(|i| (i + n) as u8).collect();
        let ciphertext = format!("wrapped:{}:{}", key_id, n).into_bytes();

        self.keys
            .lock()
            .unwrap()
            .insert(ciphertext.clone(), (key_id.to_string(), plaintext.clone()));

        Ok(DataKey {
            plaintext: Zeroizing::new(plaintext),
            ciphertext,
        })
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        key_id: &str,
        _algorithm: KeyEncryptionAlgorithm,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        let keys = self.keys.lock().unwrap();
        match keys.get(ciphertext) {
            Some((owner, plaintext)) if owner == key_id => Ok(Zeroizing::new(plaintext.clone())),
            Some(_) => Err(EncryptionError::Kms(
                "Wrong KMS key used for decryption.".to_string(),
            )),
            None => Err(EncryptionError::Kms(
                "Invalid ciphertext. The pointer may be corrupted.".to_string(),
            )),
        }
    }
}

/// Fake table source with a fixed set of tables.
#[derive(Default)]
pub struct FakeTables {
    tables: HashMap<String, TableInfo>,
    pub describe_calls: AtomicUsize,
}

impl FakeTables {
    pub fn with_table(mut self, info: TableInfo) -> Self {
        self.tables.insert(info.name.clone(), info);
        self
    }
}

impl TableMetadataSource for FakeTables {
    fn describe_table(&self, table_name: &str) -> Result<TableInfo> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.tables.get(table_name).cloned().ok_or_else(|| {
            EncryptionError::ResourceNotFound(format!("Table '{}' not found", table_name))
        })
    }
}

/// `orders` table: `id` hash key, `customer` GSI hash key.
pub fn orders_table() -> TableInfo {
    TableInfo::new("orders", TableIndex::new("id", None)).with_secondary_index(
        "by_customer",
        IndexKind::Global,
        TableIndex::new("customer", None),
    )
}

pub struct Harness {
    pub kms: Arc<FakeKms>,
    pub tables: Arc<FakeTables>,
    pub encryptor: ItemEncryptor,
}

impl Harness {
    pub fn new() -> Self {
        let kms = Arc::new(FakeKms::default());
        let tables = Arc::new(FakeTables::default().with_table(orders_table()));
        let encryptor = ItemEncryptor::new(
            kms.clone(),
            tables.clone(),
            Arc::new(LocalItemEngine::new()),
        );
        Self {
            kms,
            tables,
            encryptor,
        }
    }
}
