//! Intermediate artifacts handed from one phase to the next
//!
//! Layout under the data directory:
//!
//! ```text
//! extracted/<entity>.json            canonical records
//! transformed/<entity>.json          target items ({sale, lines} pairs for sales)
//! reports/validation_report.json
//! backups/<timestamp>/<entity>.json  copies taken before a load
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{MigrationError, MigrationResult};
use crate::extract::ExtractedRecords;
use crate::load::flatten_sales;
use crate::model::{Entity, SaleRecord, TargetItem};
use crate::validate::ValidationReport;

/// Target items of one transformed entity
#[derive(Debug, Clone, PartialEq)]
pub enum TransformedRecords {
    Parties(Entity, Vec<TargetItem>),
    Sales(Vec<SaleRecord>),
}

impl TransformedRecords {
    pub fn entity(&self) -> Entity {
        match self {
            Self::Parties(entity, _) => *entity,
            Self::Sales(_) => Entity::Sales,
        }
    }

    /// Logical records (metadata items)
    pub fn record_count(&self) -> usize {
        match self {
            Self::Parties(_, items) => items.len(),
            Self::Sales(records) => records.len(),
        }
    }

    /// Physical items in write order
    pub fn into_items(self) -> Vec<TargetItem> {
        match self {
            Self::Parties(_, items) => items,
            Self::Sales(records) => flatten_sales(records),
        }
    }
}

/// Reads and writes artifacts under a data directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    data_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn extracted_path(&self, entity: Entity) -> PathBuf {
        self.data_dir.join("extracted").join(format!("{entity}.json"))
    }

    pub fn transformed_path(&self, entity: Entity) -> PathBuf {
        self.data_dir.join("transformed").join(format!("{entity}.json"))
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join("reports").join("validation_report.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn write_extracted(&self, records: &ExtractedRecords) -> MigrationResult<PathBuf> {
        let path = self.extracted_path(records.entity());
        write_json(&path, records)?;
        Ok(path)
    }

    pub fn read_extracted(&self, entity: Entity) -> MigrationResult<ExtractedRecords> {
        let value: Value = read_json(&self.extracted_path(entity))?;
        Ok(ExtractedRecords::from_json(entity, value)?)
    }

    pub fn write_transformed(&self, records: &TransformedRecords) -> MigrationResult<PathBuf> {
        let path = self.transformed_path(records.entity());
        match records {
            TransformedRecords::Parties(_, items) => write_json(&path, items)?,
            TransformedRecords::Sales(sales) => write_json(&path, sales)?,
        }
        Ok(path)
    }

    pub fn read_transformed(&self, entity: Entity) -> MigrationResult<TransformedRecords> {
        let path = self.transformed_path(entity);
        Ok(match entity {
            Entity::Sales => TransformedRecords::Sales(read_json(&path)?),
            party => TransformedRecords::Parties(party, read_json(&path)?),
        })
    }

    /// Transformed parties, or `None` when that entity has not been transformed
    pub fn read_parties_if_present(&self, entity: Entity) -> MigrationResult<Option<Vec<TargetItem>>> {
        if !self.transformed_path(entity).exists() {
            return Ok(None);
        }
        match self.read_transformed(entity)? {
            TransformedRecords::Parties(_, items) => Ok(Some(items)),
            TransformedRecords::Sales(_) => Ok(None),
        }
    }

    pub fn write_report(&self, report: &ValidationReport) -> MigrationResult<PathBuf> {
        let path = self.report_path();
        write_json(&path, report)?;
        Ok(path)
    }

    /// Copy the existing transformed artifacts into `backups/<label>/`
    ///
    /// Returns the backup directory and the number of files copied.
    pub fn backup_transformed(&self, label: &str, entities: &[Entity]) -> MigrationResult<(PathBuf, usize)> {
        let dir = self.backups_dir().join(label);
        fs::create_dir_all(&dir)
            .map_err(|e| MigrationError::io_with_path(&dir, "creating backup directory", e))?;

        let mut copied = 0;
        for entity in entities {
            let source = self.transformed_path(*entity);
            if !source.exists() {
                continue;
            }
            let dest = dir.join(format!("{entity}.json"));
            fs::copy(&source, &dest)
                .map_err(|e| MigrationError::io_with_path(&dest, "copying backup", e))?;
            copied += 1;
        }
        Ok((dir, copied))
    }
}

/// Write JSON through a temporary file and a rename
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> MigrationResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MigrationError::io_with_path(parent, "creating directory", e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| MigrationError::io_with_path(&tmp, "writing", e))?;
    fs::rename(&tmp, path).map_err(|e| MigrationError::io_with_path(path, "renaming into place", e))
}

/// Read JSON; a missing file is [`MigrationError::MissingArtifact`]
pub fn read_json<T: DeserializeOwned>(path: &Path) -> MigrationResult<T> {
    if !path.exists() {
        return Err(MigrationError::MissingArtifact(path.to_path_buf()));
    }
    let text =
        fs::read_to_string(path).map_err(|e| MigrationError::io_with_path(path, "reading", e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sale(id: &str) -> SaleRecord {
        SaleRecord {
            sale: TargetItem::new(format!("SALE#{id}"), "METADATA"),
            lines: vec![TargetItem::new(format!("SALE#{id}"), "LINE#001")],
        }
    }

    #[test]
    fn test_transformed_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let sales = TransformedRecords::Sales(vec![sale("a"), sale("b")]);
        let path = store.write_transformed(&sales).unwrap();
        assert_eq!(path, dir.path().join("transformed").join("sales.json"));

        let read = store.read_transformed(Entity::Sales).unwrap();
        assert_eq!(read, sales);
        assert_eq!(read.record_count(), 2);
        assert_eq!(read.into_items().len(), 4);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store.read_transformed(Entity::Buyers).unwrap_err();
        assert!(matches!(err, MigrationError::MissingArtifact(_)));
        assert!(store.read_parties_if_present(Entity::Buyers).unwrap().is_none());
    }

    #[test]
    fn test_backup_copies_existing_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let buyers = TransformedRecords::Parties(
            Entity::Buyers,
            vec![TargetItem::new("BUYER#1", "METADATA")],
        );
        store.write_transformed(&buyers).unwrap();

        let (backup, copied) = store
            .backup_transformed("20240601T120000Z", &Entity::all())
            .unwrap();
        assert_eq!(copied, 1);
        assert!(backup.join("buyers.json").exists());
        assert!(!backup.join("sales.json").exists());
    }
}
