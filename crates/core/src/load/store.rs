//! Target store seam and value conversion

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use bigdecimal::BigDecimal;
use serde_json::{Number, Value};

use crate::config::TargetConfig;
use crate::error::{LoadError, StoreError};
use crate::model::TargetItem;
use crate::model::keys::{ATTR_PK, ATTR_SK};

/// Attribute value in the target's native representation
///
/// Numbers are exact decimals; the store has no binary floating point type.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    S(String),
    N(BigDecimal),
    Bool(bool),
    Null,
    L(Vec<StoreValue>),
    M(BTreeMap<String, StoreValue>),
}

impl StoreValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&BigDecimal> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }
}

/// One item ready to be written
pub type StoreItem = BTreeMap<String, StoreValue>;

/// Convert a target item, turning every number into an exact decimal
pub fn to_store_item(item: &TargetItem) -> Result<StoreItem, LoadError> {
    item.attributes()
        .iter()
        .map(|(name, value)| Ok::<_, LoadError>((name.clone(), to_store_value(name, value)?)))
        .collect()
}

fn to_store_value(attribute: &str, value: &Value) -> Result<StoreValue, LoadError> {
    Ok(match value {
        Value::Null => StoreValue::Null,
        Value::Bool(b) => StoreValue::Bool(*b),
        Value::String(s) => StoreValue::S(s.clone()),
        Value::Number(n) => StoreValue::N(to_decimal(attribute, n)?),
        Value::Array(values) => StoreValue::L(
            values
                .iter()
                .map(|v| to_store_value(attribute, v))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => StoreValue::M(
            map.iter()
                .map(|(k, v)| Ok::<_, LoadError>((k.clone(), to_store_value(attribute, v)?)))
                .collect::<Result<_, LoadError>>()?,
        ),
    })
}

/// Exact decimal from the shortest representation that round-trips
fn to_decimal(attribute: &str, n: &Number) -> Result<BigDecimal, LoadError> {
    if let Some(i) = n.as_i64() {
        return Ok(BigDecimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(BigDecimal::from(u));
    }
    let invalid = || LoadError::InvalidNumber {
        attribute: attribute.to_string(),
        value: n.to_string(),
    };
    let f = n.as_f64().filter(|f| f.is_finite()).ok_or_else(invalid)?;
    BigDecimal::from_str(&f.to_string()).map_err(|_| invalid())
}

/// Key-value store receiving the migrated items
pub trait TargetStore {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Write up to 25 items; all or nothing from the caller's view
    fn write_batch(&mut self, table: &str, items: Vec<StoreItem>) -> Result<(), StoreError>;

    /// Count items whose PK starts with `pk_prefix` and whose SK equals `sk`
    fn count_items(&mut self, table: &str, pk_prefix: &str, sk: &str) -> Result<u64, StoreError>;
}

/// Open the target store described by the configuration
pub fn connect_target(config: &TargetConfig) -> Result<Box<dyn TargetStore>, StoreError> {
    #[cfg(feature = "dynamodb")]
    {
        let target = super::dynamodb::DynamoDbTarget::connect(config)?;
        Ok(Box::new(target))
    }

    #[cfg(not(feature = "dynamodb"))]
    {
        Err(StoreError::Unsupported(format!(
            "dynamodb (table '{}'; rebuild with the `dynamodb` feature)",
            config.table
        )))
    }
}

type ItemKey = (String, String);

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<String, BTreeMap<ItemKey, StoreItem>>,
    batch_sizes: Vec<usize>,
    fail_on_batch: Option<usize>,
}

/// In-memory target keyed by (PK, SK)
///
/// Writes overwrite items with the same key. Clones share state, so a test can
/// keep a handle and inspect what an orchestrator wrote.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the n-th write call (1-based)
    pub fn failing_on_batch(self, batch: usize) -> Self {
        self.lock().fail_on_batch = Some(batch);
        self
    }

    /// Stop failing writes
    pub fn heal(&self) {
        self.lock().fail_on_batch = None;
    }

    /// Sizes of all successful and failed write calls, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn get(&self, table: &str, pk: &str, sk: &str) -> Option<StoreItem> {
        self.lock()
            .tables
            .get(table)
            .and_then(|items| items.get(&(pk.to_string(), sk.to_string())))
            .cloned()
    }

    /// All items of a table, ordered by key
    pub fn items(&self, table: &str) -> Vec<StoreItem> {
        self.lock()
            .tables
            .get(table)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn item_key(item: &StoreItem) -> Result<ItemKey, StoreError> {
    let key = |name: &str| {
        item.get(name)
            .and_then(StoreValue::as_s)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Backend(format!("item is missing string key attribute {name}")))
    };
    Ok((key(ATTR_PK)?, key(ATTR_SK)?))
}

impl TargetStore for MemoryTarget {
    fn describe(&self) -> String {
        "in-memory target".to_string()
    }

    fn write_batch(&mut self, table: &str, items: Vec<StoreItem>) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.batch_sizes.push(items.len());
        if state.fail_on_batch == Some(state.batch_sizes.len()) {
            return Err(StoreError::Backend(format!(
                "injected failure on write {}",
                state.batch_sizes.len()
            )));
        }

        let keyed = items
            .into_iter()
            .map(|item| Ok::<_, StoreError>((item_key(&item)?, item)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        state.tables.entry(table.to_string()).or_default().extend(keyed);
        Ok(())
    }

    fn count_items(&mut self, table: &str, pk_prefix: &str, sk: &str) -> Result<u64, StoreError> {
        let state = self.lock();
        let count = state.tables.get(table).map_or(0, |items| {
            items
                .keys()
                .filter(|(pk, item_sk)| pk.starts_with(pk_prefix) && item_sk == sk)
                .count()
        });
        Ok(count as u64)
    }
}
