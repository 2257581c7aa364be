//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use sale_migration_core::config::{
    DEFAULT_BUYERS_QUERY, DEFAULT_LINES_QUERY, DEFAULT_PRODUCERS_QUERY, DEFAULT_SALES_QUERY,
    MigrationConfig,
};
use sale_migration_core::extract::{Row, StaticSource};
use sale_migration_core::load::MemoryTarget;
use sale_migration_core::pipeline::Orchestrator;
use sale_migration_core::transform::SequentialIds;

pub const TABLE: &str = "sales-migration";

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

/// Two buyers, one producer, three sales with three lines in total
///
/// Sale 102 refers to a buyer that does not exist in the source.
pub fn legacy_source() -> StaticSource {
    StaticSource::new()
        .with_rows(
            DEFAULT_BUYERS_QUERY,
            rows(vec![
                json!({"id": 1, "ragione_sociale": "Rossi Srl", "piva": "IT01234567890", "citta": "Milano"}),
                json!({"id": 2, "name": "Bianchi SpA", "nazione": "FR", "stato": "offline"}),
            ]),
        )
        .with_rows(
            DEFAULT_PRODUCERS_QUERY,
            rows(vec![json!({"id": 10, "name": "Cantina Verdi", "percentuale": 12.5})]),
        )
        .with_rows(
            DEFAULT_SALES_QUERY,
            rows(vec![
                json!({"id": 100, "data": "2024-03-15", "cliente_id": 1, "fornitore_id": 10, "stato": "pagato"}),
                json!({"id": 101, "data": 20240316, "cliente_id": 2, "fornitore_id": 10}),
                json!({"id": 102, "data": "2024-03-17", "cliente_id": 99, "cliente": "Sconosciuto"}),
            ]),
        )
        .with_rows_for(
            DEFAULT_LINES_QUERY,
            vec![json!(100)],
            rows(vec![
                json!({"id": 1002, "line_number": 2, "quantita": 1, "prezzo": 10}),
                json!({"id": 1001, "line_number": 1, "quantita": 2, "prezzo": 50, "sconto": 10}),
            ]),
        )
        .with_rows_for(
            DEFAULT_LINES_QUERY,
            vec![json!(101)],
            rows(vec![json!({"id": 1010, "line_number": 1, "quantita": "3", "prezzo": "4,5"})]),
        )
}

/// Workspace for one test: data directory and checkpoint file in a temp dir
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.dir.path().join("state").join("checkpoint.json")
    }

    pub fn config(&self) -> MigrationConfig {
        MigrationConfig::new()
            .with_data_dir(self.data_dir())
            .with_checkpoint_file(self.checkpoint_file())
            .with_table(TABLE)
    }

    pub fn orchestrator(
        &self,
        config: MigrationConfig,
        source: &StaticSource,
        target: &MemoryTarget,
    ) -> Orchestrator {
        Orchestrator::new(config)
            .unwrap()
            .with_source(Box::new(source.clone()))
            .with_target(Box::new(target.clone()))
            .with_id_generator(Box::new(SequentialIds::new()))
    }

    pub fn read_json(&self, path: impl AsRef<Path>) -> Value {
        let text = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

pub fn string(item: &sale_migration_core::load::StoreItem, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s()).map(str::to_string)
}
