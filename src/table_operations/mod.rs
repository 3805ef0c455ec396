//! Table metadata lookup.
//!
//! - `TableInfo` - table name plus the key names of every index
//! - `describe` - resolve `TableInfo` from DynamoDB DescribeTable

mod describe;

pub use describe::{DynamoTableClient, table_info_from_description};

use crate::errors::Result;
use std::collections::BTreeSet;

/// Partition and optional sort key names of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndex {
    pub partition: String,
    pub sort: Option<String>,
}

impl TableIndex {
    pub fn new(partition: impl Into<String>, sort: Option<&str>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.map(str::to_string),
        }
    }

    /// Key attribute names of this index.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition.as_str()).chain(self.sort.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndex {
    pub name: String,
    pub kind: IndexKind,
    pub keys: TableIndex,
}

/// Table name and index key layout, as far as encryption cares.
///
/// Never cached by this crate. A caller holding on to one across schema
/// changes sees stale index keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub primary_index: TableIndex,
    pub secondary_indexes: Vec<SecondaryIndex>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, primary_index: TableIndex) -> Self {
        Self {
            name: name.into(),
            primary_index,
            secondary_indexes: Vec::new(),
        }
    }

    pub fn with_secondary_index(
        mut self,
        name: impl Into<String>,
        kind: IndexKind,
        keys: TableIndex,
    ) -> Self {
        self.secondary_indexes.push(SecondaryIndex {
            name: name.into(),
            kind,
            keys,
        });
        self
    }

    /// Every attribute used as a key by the table or one of its indexes.
    ///
    /// These must stay readable, or queries against the index break.
    pub fn protected_index_keys(&self) -> BTreeSet<String> {
        self.primary_index
            .attributes()
            .chain(self.secondary_indexes.iter().flat_map(|i| i.keys.attributes()))
            .map(str::to_string)
            .collect()
    }
}

/// Source of table metadata.
///
/// Implemented by [`DynamoTableClient`] and by in-memory fakes in tests.
pub trait TableMetadataSource: Send + Sync {
    fn describe_table(&self, table_name: &str) -> Result<TableInfo>;
}
