//! Describe table operation.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{KeySchemaElement, KeyType, TableDescription};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::client::{AwsConfig, build_dynamodb_client, shared_runtime};
use crate::errors::{EncryptionError, Result, map_sdk_error};
use crate::table_operations::{IndexKind, TableIndex, TableInfo, TableMetadataSource};

/// Sync DynamoDB handle used for metadata lookups.
#[derive(Clone)]
pub struct DynamoTableClient {
    client: Client,
    runtime: Arc<Runtime>,
}

impl DynamoTableClient {
    pub fn new(config: &AwsConfig) -> Result<Self> {
        let runtime = shared_runtime()?;
        let client = runtime.block_on(build_dynamodb_client(config))?;
        Ok(Self { client, runtime })
    }

    pub fn from_client(client: Client, runtime: Arc<Runtime>) -> Self {
        Self { client, runtime }
    }
}

impl TableMetadataSource for DynamoTableClient {
    fn describe_table(&self, table_name: &str) -> Result<TableInfo> {
        self.runtime
            .block_on(execute_describe_table(self.client.clone(), table_name.to_string()))
    }
}

/// Core async describe_table operation.
pub async fn execute_describe_table(client: Client, table: String) -> Result<TableInfo> {
    let output = client
        .describe_table()
        .table_name(&table)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, Some(&table)))?;

    let description = output.table().ok_or_else(|| {
        EncryptionError::DynamoDb(format!("No description returned for table '{}'", table))
    })?;

    let info = table_info_from_description(&table, description)?;
    debug!(
        table = %info.name,
        secondary_indexes = info.secondary_indexes.len(),
        "described table"
    );
    Ok(info)
}

/// Build `TableInfo` from a DescribeTable response.
pub fn table_info_from_description(
    table: &str,
    description: &TableDescription,
) -> Result<TableInfo> {
    let name = description.table_name().unwrap_or(table);
    let primary_index = index_from_key_schema(name, description.key_schema())?;
    let mut info = TableInfo::new(name, primary_index);

    for gsi in description.global_secondary_indexes() {
        let index_name = gsi.index_name().unwrap_or_default();
        let keys = index_from_key_schema(index_name, gsi.key_schema())?;
        info = info.with_secondary_index(index_name, IndexKind::Global, keys);
    }
    for lsi in description.local_secondary_indexes() {
        let index_name = lsi.index_name().unwrap_or_default();
        let keys = index_from_key_schema(index_name, lsi.key_schema())?;
        info = info.with_secondary_index(index_name, IndexKind::Local, keys);
    }

    Ok(info)
}

fn index_from_key_schema(owner: &str, schema: &[KeySchemaElement]) -> Result<TableIndex> {
    let mut partition = None;
    let mut sort = None;
    for element in schema {
        match element.key_type() {
            KeyType::Hash => partition = Some(element.attribute_name()),
            KeyType::Range => sort = Some(element.attribute_name()),
            other => {
                return Err(EncryptionError::Validation(format!(
                    "Unknown key type '{}' in key schema of '{}'",
                    other.as_str(),
                    owner
                )));
            }
        }
    }

    let partition = partition.ok_or_else(|| {
        EncryptionError::Validation(format!("Key schema of '{}' has no HASH key", owner))
    })?;
    Ok(TableIndex::new(partition, sort))
}
