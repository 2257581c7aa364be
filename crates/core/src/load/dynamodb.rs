//! DynamoDB target store
//!
//! The pipeline is synchronous, so the target owns a private Tokio runtime
//! and blocks on every SDK call.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, Select, WriteRequest};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::store::{StoreItem, StoreValue, TargetStore};
use crate::config::TargetConfig;
use crate::error::StoreError;
use crate::model::keys::{ATTR_PK, ATTR_SK};

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Target store writing to DynamoDB tables
pub struct DynamoDbTarget {
    client: Client,
    runtime: Runtime,
    description: String,
}

impl std::fmt::Debug for DynamoDbTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTarget")
            .field("description", &self.description)
            .finish()
    }
}

impl DynamoDbTarget {
    /// Build a client from the default credential chain plus configured overrides
    pub fn connect(config: &TargetConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Backend(format!("cannot start async runtime: {e}")))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = runtime.block_on(loader.load());

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let description = match &config.endpoint {
            Some(endpoint) => format!("dynamodb at {endpoint}"),
            None => format!(
                "dynamodb ({})",
                sdk_config
                    .region()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "default region".to_string())
            ),
        };

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
            description,
        })
    }
}

fn to_attribute(value: StoreValue) -> AttributeValue {
    match value {
        StoreValue::S(s) => AttributeValue::S(s),
        StoreValue::N(n) => AttributeValue::N(n.to_string()),
        StoreValue::Bool(b) => AttributeValue::Bool(b),
        StoreValue::Null => AttributeValue::Null(true),
        StoreValue::L(values) => AttributeValue::L(values.into_iter().map(to_attribute).collect()),
        StoreValue::M(map) => {
            AttributeValue::M(map.into_iter().map(|(k, v)| (k, to_attribute(v))).collect())
        }
    }
}

fn to_write_request(item: StoreItem) -> Result<WriteRequest, StoreError> {
    let attributes: HashMap<String, AttributeValue> =
        item.into_iter().map(|(k, v)| (k, to_attribute(v))).collect();
    let put = PutRequest::builder()
        .set_item(Some(attributes))
        .build()
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(WriteRequest::builder().put_request(put).build())
}

impl TargetStore for DynamoDbTarget {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn write_batch(&mut self, table: &str, items: Vec<StoreItem>) -> Result<(), StoreError> {
        let mut pending = items
            .into_iter()
            .map(to_write_request)
            .collect::<Result<Vec<_>, _>>()?;

        for attempt in 1..=MAX_ATTEMPTS {
            let request = self
                .client
                .batch_write_item()
                .request_items(table, pending)
                .send();
            let output = self.runtime.block_on(request).map_err(|e| {
                StoreError::Backend(format!(
                    "BatchWriteItem on '{table}' failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

            pending = output
                .unprocessed_items()
                .and_then(|unprocessed| unprocessed.get(table))
                .cloned()
                .unwrap_or_default();
            if pending.is_empty() {
                return Ok(());
            }

            if attempt < MAX_ATTEMPTS {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                warn!(
                    table,
                    attempt,
                    unprocessed = pending.len(),
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying unprocessed items"
                );
                thread::sleep(backoff);
            }
        }

        Err(StoreError::Unprocessed {
            remaining: pending.len(),
            attempts: MAX_ATTEMPTS,
        })
    }

    fn count_items(&mut self, table: &str, pk_prefix: &str, sk: &str) -> Result<u64, StoreError> {
        let mut total = 0u64;
        let mut last_evaluated_key = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(table)
                .select(Select::Count)
                .filter_expression("begins_with(#pk, :prefix) AND #sk = :sk")
                .expression_attribute_names("#pk", ATTR_PK)
                .expression_attribute_names("#sk", ATTR_SK)
                .expression_attribute_values(":prefix", AttributeValue::S(pk_prefix.to_string()))
                .expression_attribute_values(":sk", AttributeValue::S(sk.to_string()));

            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = self.runtime.block_on(request.send()).map_err(|e| {
                StoreError::Backend(format!("Scan on '{table}' failed: {}", DisplayErrorContext(&e)))
            })?;
            total += response.count().max(0) as u64;

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_evaluated_key = Some(key.clone()),
                _ => break,
            }
        }

        debug!(table, pk_prefix, sk, total, "Counted items");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    #[test]
    fn test_numbers_are_sent_as_decimal_strings() {
        let value = StoreValue::N(BigDecimal::from_str("5.94").unwrap());
        assert_eq!(to_attribute(value), AttributeValue::N("5.94".to_string()));
    }

    #[test]
    fn test_nested_values_convert() {
        let mut map = BTreeMap::new();
        map.insert("iban".to_string(), StoreValue::S("IT60X".to_string()));
        map.insert("tags".to_string(), StoreValue::L(vec![StoreValue::Bool(true), StoreValue::Null]));

        let AttributeValue::M(converted) = to_attribute(StoreValue::M(map)) else {
            panic!("expected map");
        };
        assert_eq!(converted["iban"], AttributeValue::S("IT60X".to_string()));
        assert_eq!(
            converted["tags"],
            AttributeValue::L(vec![AttributeValue::Bool(true), AttributeValue::Null(true)])
        );
    }

    #[test]
    fn test_write_request_carries_item() {
        let mut item = StoreItem::new();
        item.insert(ATTR_PK.to_string(), StoreValue::S("SALE#1".to_string()));
        item.insert(ATTR_SK.to_string(), StoreValue::S("METADATA".to_string()));

        let request = to_write_request(item).unwrap();
        let put = request.put_request().unwrap();
        assert_eq!(put.item()[ATTR_PK], AttributeValue::S("SALE#1".to_string()));
    }
}
