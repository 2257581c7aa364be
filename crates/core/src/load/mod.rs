//! Chunked writes into the target store
//!
//! Items are converted to the store's native representation up front, then
//! written in consecutive chunks of at most [`MAX_BATCH_SIZE`] items. A failed
//! chunk stops the entity; everything written before it stays in place and a
//! rerun overwrites it by key.

#[cfg(feature = "dynamodb")]
mod dynamodb;
mod store;

#[cfg(feature = "dynamodb")]
pub use self::dynamodb::DynamoDbTarget;
pub use store::{MemoryTarget, StoreItem, StoreValue, TargetStore, connect_target, to_store_item};

use tracing::{debug, info};

use crate::context::MigrationContext;
use crate::error::LoadError;
use crate::model::{SaleRecord, TargetItem};

/// Most items the target accepts in one batch write
pub const MAX_BATCH_SIZE: usize = 25;

/// Counters of one loaded entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub table: String,
    /// Logical records (metadata items)
    pub records: usize,
    /// Physical items written
    pub items: usize,
    pub batches: usize,
}

/// What a load would write, computed without touching the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub records: usize,
    pub lines: usize,
    pub items: usize,
    pub batches: usize,
}

/// Count records, lines and chunks for a dry run
pub fn plan(items: &[TargetItem], batch_size: usize) -> LoadPlan {
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let records = items.iter().filter(|item| item.is_metadata()).count();
    LoadPlan {
        records,
        lines: items.len() - records,
        items: items.len(),
        batches: items.len().div_ceil(batch_size),
    }
}

/// Flatten sales into one item sequence, each sale followed by its lines
pub fn flatten_sales(sales: Vec<SaleRecord>) -> Vec<TargetItem> {
    let mut items = Vec::with_capacity(sales.iter().map(SaleRecord::item_count).sum());
    for record in sales {
        items.extend(record.into_items());
    }
    items
}

/// Writes items through a [`TargetStore`]
pub struct Loader<'a> {
    store: &'a mut dyn TargetStore,
    batch_size: usize,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a mut dyn TargetStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Write all items to `table`
    ///
    /// Cancellation is checked before every chunk. Progress advances once
    /// per metadata item, so a sale and its lines count as one record.
    pub fn load(
        &mut self,
        table: &str,
        items: &[TargetItem],
        ctx: &MigrationContext,
    ) -> Result<LoadStats, LoadError> {
        let converted = items
            .iter()
            .map(|item| Ok::<_, LoadError>((item.is_metadata(), to_store_item(item)?)))
            .collect::<Result<Vec<_>, LoadError>>()?;
        let records = converted.iter().filter(|(metadata, _)| *metadata).count();

        info!(
            table,
            target = %self.store.describe(),
            items = converted.len(),
            records,
            "Writing items"
        );

        let mut task = ctx.progress().task(format!("load {table}"), records as u64);
        let mut written = 0;
        let mut batches = 0;

        for chunk in converted.chunks(self.batch_size) {
            if ctx.is_cancelled() {
                task.abandon("cancelled");
                return Err(LoadError::Cancelled { written });
            }

            let batch = batches + 1;
            let payload = chunk.iter().map(|(_, item)| item.clone()).collect::<Vec<_>>();
            if let Err(source) = self.store.write_batch(table, payload) {
                task.error(chunk.len() as u64);
                task.abandon(&format!("batch {batch} failed"));
                return Err(LoadError::BatchFailed {
                    table: table.to_string(),
                    batch,
                    written,
                    source,
                });
            }

            debug!(table, batch, size = chunk.len(), "Batch written");
            written += chunk.len();
            batches = batch;
            task.inc(chunk.iter().filter(|(metadata, _)| *metadata).count() as u64);
        }

        task.finish();
        Ok(LoadStats {
            table: table.to_string(),
            records,
            items: written,
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::error::StoreError;

    fn items(n: usize) -> Vec<TargetItem> {
        (0..n)
            .map(|i| TargetItem::new(format!("BUYER#{i}"), "METADATA"))
            .collect()
    }

    fn sale(id: &str, lines: usize) -> SaleRecord {
        let pk = format!("SALE#{id}");
        SaleRecord {
            sale: TargetItem::new(pk.clone(), "METADATA"),
            lines: (1..=lines)
                .map(|n| TargetItem::new(pk.clone(), format!("LINE#{n:03}")))
                .collect(),
        }
    }

    #[test]
    fn test_53_items_in_three_chunks() {
        let mut target = MemoryTarget::new();
        let handle = target.clone();
        let ctx = MigrationContext::default();

        let stats = Loader::new(&mut target, 25)
            .load("migration", &items(53), &ctx)
            .unwrap();

        assert_eq!(handle.batch_sizes(), vec![25, 25, 3]);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.items, 53);
        assert_eq!(stats.records, 53);
        assert_eq!(handle.item_count("migration"), 53);
    }

    #[test]
    fn test_batch_size_is_capped() {
        let mut target = MemoryTarget::new();
        let handle = target.clone();
        Loader::new(&mut target, 100)
            .load("t", &items(30), &MigrationContext::default())
            .unwrap();
        assert_eq!(handle.batch_sizes(), vec![25, 5]);
    }

    #[test]
    fn test_failed_chunk_keeps_earlier_writes() {
        let mut target = MemoryTarget::new().failing_on_batch(2);
        let handle = target.clone();

        let err = Loader::new(&mut target, 10)
            .load("t", &items(35), &MigrationContext::default())
            .unwrap_err();

        match err {
            LoadError::BatchFailed {
                batch,
                written,
                source: StoreError::Backend(_),
                ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(written, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(handle.item_count("t"), 10);
    }

    #[test]
    fn test_rerun_after_failure_overwrites() {
        let mut target = MemoryTarget::new().failing_on_batch(2);
        let handle = target.clone();
        let data = items(35);
        let ctx = MigrationContext::default();

        assert!(Loader::new(&mut target, 10).load("t", &data, &ctx).is_err());
        handle.heal();
        Loader::new(&mut target, 10).load("t", &data, &ctx).unwrap();

        assert_eq!(handle.item_count("t"), 35);
    }

    #[test]
    fn test_cancelled_before_first_chunk() {
        let mut target = MemoryTarget::new();
        let handle = target.clone();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = MigrationContext::default().with_cancellation(token);

        let err = Loader::new(&mut target, 25)
            .load("t", &items(5), &ctx)
            .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled { written: 0 }));
        assert!(handle.batch_sizes().is_empty());
    }

    /// Cancels the run once its first batch is written
    struct CancelAfterFirstBatch {
        inner: MemoryTarget,
        token: CancellationToken,
    }

    impl TargetStore for CancelAfterFirstBatch {
        fn describe(&self) -> String {
            "cancel after first batch".to_string()
        }

        fn write_batch(&mut self, table: &str, items: Vec<StoreItem>) -> Result<(), StoreError> {
            self.inner.write_batch(table, items)?;
            self.token.cancel();
            Ok(())
        }

        fn count_items(&mut self, table: &str, pk_prefix: &str, sk: &str) -> Result<u64, StoreError> {
            self.inner.count_items(table, pk_prefix, sk)
        }
    }

    #[test]
    fn test_cancelled_between_chunks() {
        let handle = MemoryTarget::new();
        let token = CancellationToken::new();
        let mut target = CancelAfterFirstBatch {
            inner: handle.clone(),
            token: token.clone(),
        };
        let ctx = MigrationContext::default().with_cancellation(token);

        let err = Loader::new(&mut target, 10)
            .load("t", &items(35), &ctx)
            .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled { written: 10 }));
        assert_eq!(handle.batch_sizes(), vec![10]);
        assert_eq!(handle.item_count("t"), 10);
    }

    #[test]
    fn test_sales_count_once_per_record() {
        let items = flatten_sales(vec![sale("a", 2), sale("b", 0), sale("c", 3)]);
        assert_eq!(items.len(), 8);
        assert_eq!(items[0].sk(), Some("METADATA"));
        assert_eq!(items[1].sk(), Some("LINE#001"));

        let mut target = MemoryTarget::new();
        let stats = Loader::new(&mut target, 25)
            .load("t", &items, &MigrationContext::default())
            .unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.items, 8);
    }

    #[test]
    fn test_plan_counts_without_writing() {
        let items = flatten_sales(vec![sale("a", 30), sale("b", 1)]);
        let plan = plan(&items, 25);
        assert_eq!(
            plan,
            LoadPlan {
                records: 2,
                lines: 31,
                items: 33,
                batches: 2,
            }
        );
    }
}
