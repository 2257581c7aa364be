//! Post-load count comparison

use tracing::info;

use crate::error::VerificationError;
use crate::load::TargetStore;
use crate::model::Entity;
use crate::model::keys::{METADATA_SK, entity_pk_prefix};

/// Compare the metadata items of `entity` in `table` with the expected count
///
/// Several entity kinds may share one table, so items are counted by their
/// PK prefix.
pub fn verify_entity(
    store: &mut dyn TargetStore,
    table: &str,
    entity: Entity,
    expected: u64,
) -> Result<u64, VerificationError> {
    let actual = store.count_items(table, &entity_pk_prefix(entity), METADATA_SK)?;
    if actual != expected {
        return Err(VerificationError::CountMismatch {
            entity,
            table: table.to_string(),
            expected,
            actual,
        });
    }
    info!(%entity, table, count = actual, "Verified item count");
    Ok(actual)
}
