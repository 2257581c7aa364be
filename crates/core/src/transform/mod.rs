//! Transformation of canonical records into keyed target items
//!
//! Buyers and producers become one `METADATA` item each. Sales become a
//! [`SaleRecord`]: the sale item with buyer and producer snapshots embedded,
//! plus one item per line under the sale's partition key.

pub mod financial;
mod party;
mod sale;
pub mod status;

pub use party::{transform_buyer, transform_producer};
pub use sale::{PartyIndex, PartySnapshot};
pub use status::{PartyStatus, SaleStatus};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MigrationOptions;
use crate::context::MigrationContext;
use crate::dates::format_utc;
use crate::error::TransformationError;
use crate::model::{CanonicalBuyer, CanonicalProducer, CanonicalSale, Entity, SaleRecord, TargetItem};

/// Source of surrogate ids
pub trait IdGenerator {
    fn next_id(&mut self, entity: Entity) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self, _entity: Entity) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Predictable ids (`b-0001`, `p-0001`, `s-0001`, ...), one counter per entity
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    buyers: u64,
    producers: u64,
    sales: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self, entity: Entity) -> String {
        let (prefix, counter) = match entity {
            Entity::Buyers => ("b", &mut self.buyers),
            Entity::Producers => ("p", &mut self.producers),
            Entity::Sales => ("s", &mut self.sales),
        };
        *counter += 1;
        format!("{}-{:04}", prefix, counter)
    }
}

/// Settings shared by every record of a run
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    /// Written to `createdBy`/`updatedBy`
    pub migration_user: String,
    /// Applied to lines without a tax rate, in percent
    pub default_tax_rate: f64,
    /// Audit timestamp for records without their own
    pub run_timestamp: String,
}

impl TransformOptions {
    pub fn new(options: &MigrationOptions, started_at: DateTime<Utc>) -> Self {
        Self {
            migration_user: options.migration_user.clone(),
            default_tax_rate: options.default_tax_rate,
            run_timestamp: format_utc(started_at),
        }
    }

    /// Run date (`YYYY-MM-DD`)
    pub fn run_date(&self) -> &str {
        self.run_timestamp.get(..10).unwrap_or(&self.run_timestamp)
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self::new(&MigrationOptions::default(), Utc::now())
    }
}

/// Turns canonical records into target items
pub struct Transformer<'a> {
    ids: &'a mut dyn IdGenerator,
    options: &'a TransformOptions,
}

impl<'a> Transformer<'a> {
    pub fn new(ids: &'a mut dyn IdGenerator, options: &'a TransformOptions) -> Self {
        Self { ids, options }
    }

    pub fn transform_buyers(
        &mut self,
        buyers: &[CanonicalBuyer],
        ctx: &MigrationContext,
    ) -> Result<Vec<TargetItem>, TransformationError> {
        let mut task = ctx.progress().task("transform buyers", buyers.len() as u64);
        let mut items = Vec::with_capacity(buyers.len());
        for buyer in buyers {
            require_source_id(Entity::Buyers, &buyer.party.source_id)?;
            let id = self.ids.next_id(Entity::Buyers);
            items.push(transform_buyer(buyer, &id, self.options));
            task.inc(1);
        }
        task.finish();
        info!(entity = "buyers", count = items.len(), "Transformed records");
        Ok(items)
    }

    pub fn transform_producers(
        &mut self,
        producers: &[CanonicalProducer],
        ctx: &MigrationContext,
    ) -> Result<Vec<TargetItem>, TransformationError> {
        let mut task = ctx.progress().task("transform producers", producers.len() as u64);
        let mut items = Vec::with_capacity(producers.len());
        for producer in producers {
            require_source_id(Entity::Producers, &producer.party.source_id)?;
            let id = self.ids.next_id(Entity::Producers);
            items.push(transform_producer(producer, &id, self.options));
            task.inc(1);
        }
        task.finish();
        info!(entity = "producers", count = items.len(), "Transformed records");
        Ok(items)
    }

    /// Transform sales, resolving party references through `parties`
    pub fn transform_sales(
        &mut self,
        sales: &[CanonicalSale],
        parties: &PartyIndex,
        ctx: &MigrationContext,
    ) -> Result<Vec<SaleRecord>, TransformationError> {
        let mut task = ctx.progress().task("transform sales", sales.len() as u64);
        let mut records = Vec::with_capacity(sales.len());
        for canonical in sales {
            require_source_id(Entity::Sales, &canonical.source_id)?;
            let id = self.ids.next_id(Entity::Sales);
            let record = sale::transform_sale(canonical, &id, parties, self.options);
            debug!(sale = %id, source_id = %canonical.source_id, lines = record.lines.len(), "Transformed sale");
            records.push(record);
            task.inc(1);
        }
        task.finish();

        let lines: usize = records.iter().map(|r| r.lines.len()).sum();
        info!(entity = "sales", count = records.len(), lines, "Transformed records");
        Ok(records)
    }
}

fn require_source_id(entity: Entity, source_id: &str) -> Result<(), TransformationError> {
    if source_id.trim().is_empty() {
        return Err(TransformationError::InvalidRecord {
            entity,
            source_id: String::new(),
            message: "record has no source identifier".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PartyFields;

    #[test]
    fn test_sequential_ids_per_entity() {
        let mut ids = SequentialIds::new();
        assert_eq!(ids.next_id(Entity::Buyers), "b-0001");
        assert_eq!(ids.next_id(Entity::Buyers), "b-0002");
        assert_eq!(ids.next_id(Entity::Sales), "s-0001");
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let mut ids = UuidGenerator;
        assert_ne!(ids.next_id(Entity::Sales), ids.next_id(Entity::Sales));
    }

    #[test]
    fn test_run_date() {
        let options = TransformOptions {
            run_timestamp: "2024-05-06T07:08:09Z".to_string(),
            ..Default::default()
        };
        assert_eq!(options.run_date(), "2024-05-06");
    }

    #[test]
    fn test_empty_source_id_rejected() {
        let mut ids = SequentialIds::new();
        let options = TransformOptions::default();
        let buyer = CanonicalBuyer {
            party: PartyFields::default(),
            ..Default::default()
        };

        let err = Transformer::new(&mut ids, &options)
            .transform_buyers(&[buyer], &MigrationContext::default())
            .unwrap_err();
        assert!(matches!(err, TransformationError::InvalidRecord { entity: Entity::Buyers, .. }));
    }
}
