//! Key design of the single target table
//!
//! Every item has a partition key `<ENTITY>#<id>` and a sort key. An entity's
//! own record uses the literal `METADATA`; sale lines share their sale's
//! partition key and sort by `LINE#<padded position>`, the 1-based position of the line
//! in line-number order. Secondary index
//! keys pair a fixed prefix with a natural sort value.

use super::Entity;

pub const ATTR_PK: &str = "PK";
pub const ATTR_SK: &str = "SK";

/// Sort key of an entity's own record
pub const METADATA_SK: &str = "METADATA";

/// Sort key prefix of sale lines
pub const LINE_SK_PREFIX: &str = "LINE#";

pub const STATUS_PREFIX: &str = "STATUS#";
pub const COUNTRY_PREFIX: &str = "COUNTRY#";

/// Secondary index attribute names, as (partition, sort) pairs
pub const GSI1: (&str, &str) = ("GSI1PK", "GSI1SK");
pub const GSI2: (&str, &str) = ("GSI2PK", "GSI2SK");
pub const GSI3: (&str, &str) = ("GSI3PK", "GSI3SK");
pub const GSI4: (&str, &str) = ("GSI4PK", "GSI4SK");

/// Width line positions are padded to in sort keys
pub const LINE_POSITION_WIDTH: usize = 3;

/// Partition key of an entity instance
pub fn entity_pk(entity: Entity, id: &str) -> String {
    format!("{}#{}", entity.key_prefix(), id)
}

/// Prefix every partition key of an entity starts with
pub fn entity_pk_prefix(entity: Entity) -> String {
    format!("{}#", entity.key_prefix())
}

/// Sort key of the sale line at 1-based `position`
pub fn line_sk(position: i64) -> String {
    format!(
        "{LINE_SK_PREFIX}{:0width$}",
        position,
        width = LINE_POSITION_WIDTH
    )
}

/// Index key grouping items by status
pub fn status_key(status: &str) -> String {
    format!("{STATUS_PREFIX}{status}")
}

/// Index key grouping parties by country
pub fn country_key(country: &str) -> String {
    format!("{COUNTRY_PREFIX}{country}")
}

/// Index key holding every record of an entity kind (`BUYER`, `SALE`, ...)
pub fn type_key(entity: Entity) -> &'static str {
    entity.key_prefix()
}
