//! Extraction of canonical records from the relational source
//!
//! The [`Extractor`] runs the configured query for an entity, resolves every
//! row through the field tables in [`fields`] and returns typed canonical
//! records. Sales additionally fetch their lines with one query per sale.

#[cfg(feature = "duckdb")]
mod duckdb;
pub mod fields;
mod source;

#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDbSource;
pub use fields::{FieldDefault, FieldKind, FieldSpec, resolve_field};
pub use source::{QueryKind, Row, SourceConnection, SqlQuery, StaticSource, connect_source};

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::context::MigrationContext;
use crate::error::ExtractionError;
use crate::model::{CanonicalBuyer, CanonicalProducer, CanonicalSale, CanonicalSaleLine, Entity};
use fields::{
    BUYER_FIELDS, LINE_NUMBER, PARTY_FIELDS, PRODUCER_FIELDS, SALE_FIELDS, SALE_LINE_FIELDS,
    SOURCE_ID, first_present, resolve_fields,
};

/// Canonical records of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedRecords {
    Buyers(Vec<CanonicalBuyer>),
    Producers(Vec<CanonicalProducer>),
    Sales(Vec<CanonicalSale>),
}

impl ExtractedRecords {
    /// Parse a persisted extraction artifact
    pub fn from_json(entity: Entity, value: Value) -> serde_json::Result<Self> {
        Ok(match entity {
            Entity::Buyers => Self::Buyers(serde_json::from_value(value)?),
            Entity::Producers => Self::Producers(serde_json::from_value(value)?),
            Entity::Sales => Self::Sales(serde_json::from_value(value)?),
        })
    }

    pub fn entity(&self) -> Entity {
        match self {
            Self::Buyers(_) => Entity::Buyers,
            Self::Producers(_) => Entity::Producers,
            Self::Sales(_) => Entity::Sales,
        }
    }

    /// Number of top-level records
    pub fn len(&self) -> usize {
        match self {
            Self::Buyers(records) => records.len(),
            Self::Producers(records) => records.len(),
            Self::Sales(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads one entity at a time from a source connection
pub struct Extractor<'a> {
    source: &'a mut dyn SourceConnection,
    config: &'a ExtractionConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(source: &'a mut dyn SourceConnection, config: &'a ExtractionConfig) -> Self {
        Self { source, config }
    }

    /// Configured query for an entity, with its paging
    pub fn entity_query(&self, entity: Entity) -> SqlQuery {
        let settings = self.config.for_entity(entity);
        SqlQuery::new(self.config.query_for(entity)).with_paging(settings.limit, settings.offset)
    }

    /// Number of rows the entity query returns
    pub fn count(&mut self, entity: Entity) -> Result<u64, ExtractionError> {
        let query = self.entity_query(entity);
        Ok(self.source.count(&query)?)
    }

    /// Extract all records of an entity
    pub fn extract(
        &mut self,
        entity: Entity,
        ctx: &MigrationContext,
    ) -> Result<ExtractedRecords, ExtractionError> {
        let query = self.entity_query(entity);
        let total = self.source.count(&query)?;
        info!(entity = %entity, count = total, source = %self.source.describe(), "Extracting records");

        let rows = self.source.fetch(&query)?;
        let mut task = ctx.progress().task(format!("extract {entity}"), rows.len() as u64);

        let records = match entity {
            Entity::Buyers => {
                let mut buyers = Vec::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    buyers.push(canonical_party(entity, index, row, BUYER_FIELDS)?);
                    task.inc(1);
                }
                ExtractedRecords::Buyers(buyers)
            }
            Entity::Producers => {
                let mut producers = Vec::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    producers.push(canonical_party(entity, index, row, PRODUCER_FIELDS)?);
                    task.inc(1);
                }
                ExtractedRecords::Producers(producers)
            }
            Entity::Sales => {
                let mut sales = Vec::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    sales.push(self.canonical_sale(index, row)?);
                    task.inc(1);
                }
                ExtractedRecords::Sales(sales)
            }
        };

        let stats = task.finish();
        debug!(entity = %entity, records = records.len(), elapsed_ms = stats.elapsed.as_millis() as u64, "Extraction finished");
        Ok(records)
    }

    fn canonical_sale(&mut self, index: usize, row: &Row) -> Result<CanonicalSale, ExtractionError> {
        let mut map = Map::new();
        let source_id = resolve_record(Entity::Sales, index, row, SALE_FIELDS, &mut map)?;

        let lines = if self.config.sales.include_lines {
            let raw_id = first_present(row, SOURCE_ID.candidates)
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null);
            let query = SqlQuery::new(self.config.lines_query()).with_params(vec![raw_id]);
            let line_rows = self.source.fetch(&query)?;
            canonical_lines(&source_id, &line_rows)?
        } else {
            Vec::new()
        };

        let mut sale: CanonicalSale = into_canonical(Entity::Sales, &source_id, map)?;
        sale.lines = lines;
        Ok(sale)
    }
}

/// Resolve a row into a field map and return its source id
fn resolve_record(
    entity: Entity,
    index: usize,
    row: &Row,
    specs: &[FieldSpec],
    map: &mut Map<String, Value>,
) -> Result<String, ExtractionError> {
    let record_label = || {
        first_present(row, SOURCE_ID.candidates)
            .map(|(_, value)| match value {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| format!("row {}", index + 1))
    };

    resolve_fields(row, specs, map).map_err(|source| ExtractionError::InvalidField {
        entity,
        record: record_label(),
        source,
    })?;

    match map.get(SOURCE_ID.name).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ExtractionError::MissingSourceId {
            entity,
            row: index + 1,
            candidates: SOURCE_ID.candidates.join(", "),
        }),
    }
}

fn canonical_party<T: serde::de::DeserializeOwned>(
    entity: Entity,
    index: usize,
    row: &Row,
    extra: &[FieldSpec],
) -> Result<T, ExtractionError> {
    let mut map = Map::new();
    let source_id = resolve_record(entity, index, row, PARTY_FIELDS, &mut map)?;
    resolve_fields(row, extra, &mut map).map_err(|source| ExtractionError::InvalidField {
        entity,
        record: source_id.clone(),
        source,
    })?;
    into_canonical(entity, &source_id, map)
}

fn into_canonical<T: serde::de::DeserializeOwned>(
    entity: Entity,
    source_id: &str,
    map: Map<String, Value>,
) -> Result<T, ExtractionError> {
    serde_json::from_value(Value::Object(map)).map_err(|e| ExtractionError::Shape {
        entity,
        record: source_id.to_string(),
        message: e.to_string(),
    })
}

/// Resolve, number and order the lines of one sale
fn canonical_lines(sale_id: &str, rows: &[Row]) -> Result<Vec<CanonicalSaleLine>, ExtractionError> {
    let mut resolved = Vec::with_capacity(rows.len());

    for (position, row) in rows.iter().enumerate() {
        let mut map = Map::new();
        let line_id = resolve_record(Entity::Sales, position, row, SALE_LINE_FIELDS, &mut map)
            .map_err(|e| match e {
                ExtractionError::MissingSourceId { entity, candidates, .. } => {
                    ExtractionError::Shape {
                        entity,
                        record: sale_id.to_string(),
                        message: format!(
                            "line {} has no source identifier (looked for: {})",
                            position + 1,
                            candidates
                        ),
                    }
                }
                other => other,
            })?;

        // Zero and negative numbers are placeholders, not real line numbers
        let line_number = match map.get(LINE_NUMBER.name).and_then(Value::as_i64) {
            Some(n) if n > 0 => n,
            _ => {
                let n = position as i64 + 1;
                warn!(sale = %sale_id, line = %line_id, position = n, "Line has no usable line number, using its position");
                map.insert(LINE_NUMBER.name.to_string(), Value::from(n));
                n
            }
        };

        resolved.push((line_number, line_id, map));
    }

    // Storage order must not matter: sort by line number, then row id
    resolved.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| compare_ids(&a.1, &b.1)));

    resolved
        .into_iter()
        .map(|(_, line_id, map)| into_canonical(Entity::Sales, &line_id, map))
        .collect()
}

/// Compare ids numerically when both are integers
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BUYERS_QUERY, DEFAULT_LINES_QUERY, DEFAULT_SALES_QUERY};
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_extract_buyers_with_defaults() {
        let mut source = StaticSource::new().with_rows(
            DEFAULT_BUYERS_QUERY,
            rows(vec![
                json!({"id": 1, "ragione_sociale": "Rossi Srl", "piva": "IT01234567890", "citta": "Milano"}),
                json!({"id": 2, "name": "Bianchi SpA", "nazione": "FR", "valuta": "CHF"}),
            ]),
        );
        let config = ExtractionConfig::default();
        let ctx = MigrationContext::default();

        let records = Extractor::new(&mut source, &config)
            .extract(Entity::Buyers, &ctx)
            .unwrap();

        let ExtractedRecords::Buyers(buyers) = records else {
            panic!("expected buyers");
        };
        assert_eq!(buyers.len(), 2);
        assert_eq!(buyers[0].party.source_id, "1");
        assert_eq!(buyers[0].party.name.as_deref(), Some("Rossi Srl"));
        assert_eq!(buyers[0].party.vat_number.as_deref(), Some("IT01234567890"));
        assert_eq!(buyers[0].party.country.as_deref(), Some("IT"));
        assert_eq!(buyers[0].currency.as_deref(), Some("EUR"));
        assert_eq!(buyers[0].preferred_language.as_deref(), Some("it"));
        assert_eq!(buyers[1].party.country.as_deref(), Some("FR"));
        assert_eq!(buyers[1].currency.as_deref(), Some("CHF"));
    }

    #[test]
    fn test_missing_source_id_is_error() {
        let mut source = StaticSource::new().with_rows(
            DEFAULT_BUYERS_QUERY,
            rows(vec![json!({"name": "No Id Srl"})]),
        );
        let config = ExtractionConfig::default();

        let err = Extractor::new(&mut source, &config)
            .extract(Entity::Buyers, &MigrationContext::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingSourceId { row: 1, .. }));
    }

    #[test]
    fn test_uncoercible_value_is_error() {
        let mut source = StaticSource::new().with_rows(
            DEFAULT_SALES_QUERY,
            rows(vec![json!({"id": 5, "totale": "lots"})]),
        );
        let config = ExtractionConfig::default();

        let err = Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap_err();
        match err {
            ExtractionError::InvalidField { record, source, .. } => {
                assert_eq!(record, "5");
                assert_eq!(source.field, "total");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sale_lines_sorted_with_ties() {
        let mut source = StaticSource::new()
            .with_rows(DEFAULT_SALES_QUERY, rows(vec![json!({"id": 10, "data": 20240315})]))
            .with_rows_for(
                DEFAULT_LINES_QUERY,
                vec![json!(10)],
                rows(vec![
                    json!({"id": 103, "line_number": 2, "quantita": "2", "prezzo": "5,5"}),
                    json!({"id": 102, "line_number": 1}),
                    json!({"id": 101, "line_number": 2}),
                ]),
            );
        let config = ExtractionConfig::default();

        let records = Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap();
        let ExtractedRecords::Sales(sales) = records else {
            panic!("expected sales");
        };

        let sale = &sales[0];
        assert_eq!(sale.sale_date.as_deref(), Some("2024-03-15"));
        assert_eq!(sale.doc_type.as_deref(), Some("invoice"));
        let order: Vec<&str> = sale.lines.iter().map(|l| l.source_id.as_str()).collect();
        assert_eq!(order, vec!["102", "101", "103"]);
        assert_eq!(sale.lines[2].quantity, 2.0);
        assert_eq!(sale.lines[2].unit_price, 5.5);
        assert_eq!(sale.lines[1].quantity, 1.0);
        assert_eq!(sale.lines[1].discount, 0.0);
        assert!(sale.lines[1].tax_rate.is_none());
    }

    #[test]
    fn test_missing_line_number_uses_position() {
        let mut source = StaticSource::new()
            .with_rows(DEFAULT_SALES_QUERY, rows(vec![json!({"id": 1})]))
            .with_rows_for(
                DEFAULT_LINES_QUERY,
                vec![json!(1)],
                rows(vec![json!({"id": 7}), json!({"id": 8})]),
            );
        let config = ExtractionConfig::default();

        let records = Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap();
        let ExtractedRecords::Sales(sales) = records else {
            panic!("expected sales");
        };
        let numbers: Vec<i64> = sales[0].lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_non_positive_line_number_uses_position() {
        let mut source = StaticSource::new()
            .with_rows(DEFAULT_SALES_QUERY, rows(vec![json!({"id": 1})]))
            .with_rows_for(
                DEFAULT_LINES_QUERY,
                vec![json!(1)],
                rows(vec![
                    json!({"id": 7, "line_number": 0}),
                    json!({"id": 8, "line_number": -3}),
                    json!({"id": 9, "line_number": 5}),
                ]),
            );
        let config = ExtractionConfig::default();

        let records = Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap();
        let ExtractedRecords::Sales(sales) = records else {
            panic!("expected sales");
        };
        let numbers: Vec<(&str, i64)> = sales[0]
            .lines
            .iter()
            .map(|l| (l.source_id.as_str(), l.line_number))
            .collect();
        assert_eq!(numbers, vec![("7", 1), ("8", 2), ("9", 5)]);
    }

    #[test]
    fn test_sale_lines_fetched_by_first_id() {
        let mut source = StaticSource::new()
            .with_rows(DEFAULT_SALES_QUERY, rows(vec![json!({"id": 7, "first_id": 9001})]))
            .with_rows_for(
                DEFAULT_LINES_QUERY,
                vec![json!(9001)],
                rows(vec![json!({"id": 1, "line_number": 1})]),
            );
        let config = ExtractionConfig::default();

        let records = Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap();
        let ExtractedRecords::Sales(sales) = records else {
            panic!("expected sales");
        };
        assert_eq!(sales[0].source_id, "9001");
        assert_eq!(sales[0].lines.len(), 1);
    }

    #[test]
    fn test_include_lines_disabled_skips_line_query() {
        let mut source = StaticSource::new()
            .with_rows(DEFAULT_SALES_QUERY, rows(vec![json!({"id": 1}), json!({"id": 2})]));
        let handle = source.clone();
        let mut config = ExtractionConfig::default();
        config.sales.include_lines = false;

        Extractor::new(&mut source, &config)
            .extract(Entity::Sales, &MigrationContext::default())
            .unwrap();

        assert!(handle
            .query_log()
            .iter()
            .all(|(_, sql)| !sql.contains("msg_line")));
    }

    #[test]
    fn test_paging_from_config() {
        let mut source = StaticSource::new().with_rows(
            DEFAULT_BUYERS_QUERY,
            rows((1..=10).map(|i| json!({"id": i})).collect()),
        );
        let mut config = ExtractionConfig::default();
        config.buyers.limit = Some(3);
        config.buyers.offset = 4;

        let mut extractor = Extractor::new(&mut source, &config);
        assert_eq!(extractor.count(Entity::Buyers).unwrap(), 3);
        let records = extractor
            .extract(Entity::Buyers, &MigrationContext::default())
            .unwrap();
        let ExtractedRecords::Buyers(buyers) = records else {
            panic!("expected buyers");
        };
        let ids: Vec<&str> = buyers.iter().map(|b| b.party.source_id.as_str()).collect();
        assert_eq!(ids, vec!["5", "6", "7"]);
    }

    #[test]
    fn test_artifact_round_trip() {
        let records = ExtractedRecords::Producers(vec![CanonicalProducer::default()]);
        let value = serde_json::to_value(&records).unwrap();
        assert!(value.is_array());
        let parsed = ExtractedRecords::from_json(Entity::Producers, value).unwrap();
        assert_eq!(parsed, records);
    }
}
