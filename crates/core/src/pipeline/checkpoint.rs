//! Checkpointing for resume
//!
//! A checkpoint records, per phase, the entities that phase has fully
//! completed. Entries are only added after an entity succeeds, so there are
//! never partial-entity checkpoints.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CheckpointConfig;
use crate::dates::format_utc;
use crate::error::CheckpointError;
use crate::model::{Entity, Phase};

/// Completion marker of one phase and entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Records processed
    pub progress: u64,
    /// ISO-8601 UTC time of completion
    pub timestamp: String,
}

/// Completed phases and entities
///
/// Persisted as `{"<phase>": {"<entity>": {"progress": n, "timestamp": ".."}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(BTreeMap<Phase, BTreeMap<Entity, CheckpointEntry>>);

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn entry(&self, phase: Phase, entity: Entity) -> Option<&CheckpointEntry> {
        self.0.get(&phase).and_then(|entities| entities.get(&entity))
    }

    pub fn is_complete(&self, phase: Phase, entity: Entity) -> bool {
        self.entry(phase, entity).is_some()
    }

    /// Whether every given entity completed the phase
    pub fn is_phase_complete(&self, phase: Phase, entities: &[Entity]) -> bool {
        entities.iter().all(|entity| self.is_complete(phase, *entity))
    }

    /// First checkpointed phase some entity has not completed
    pub fn next_phase(&self, entities: &[Entity]) -> Option<Phase> {
        Phase::checkpointed()
            .into_iter()
            .find(|phase| !self.is_phase_complete(*phase, entities))
    }

    /// Record a completed phase and entity
    pub fn record(&mut self, phase: Phase, entity: Entity, progress: u64, timestamp: String) {
        self.0
            .entry(phase)
            .or_default()
            .insert(entity, CheckpointEntry { progress, timestamp });
    }

    /// Entries in phase order, then entity order
    pub fn entries(&self) -> impl Iterator<Item = (Phase, Entity, &CheckpointEntry)> {
        self.0.iter().flat_map(|(phase, entities)| {
            entities
                .iter()
                .map(move |(entity, entry)| (*phase, *entity, entry))
        })
    }
}

/// Persists a [`Checkpoint`] to a JSON file
///
/// When disabled nothing is read or written and [`CheckpointStore::load`]
/// always yields an empty checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    enabled: bool,
    current: Checkpoint,
}

impl CheckpointStore {
    pub fn new(config: &CheckpointConfig) -> Self {
        Self {
            path: config.file.clone(),
            enabled: config.enabled,
            current: Checkpoint::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checkpoint as last loaded or saved
    pub fn current(&self) -> &Checkpoint {
        &self.current
    }

    /// Read the persisted checkpoint; empty when absent or disabled
    pub fn load(&mut self) -> Result<&Checkpoint, CheckpointError> {
        self.current = if self.enabled && self.path.exists() {
            read_checkpoint(&self.path)?
        } else {
            Checkpoint::new()
        };
        Ok(&self.current)
    }

    /// Merge one completion entry and persist atomically
    pub fn save(&mut self, phase: Phase, entity: Entity, progress: u64) -> Result<(), CheckpointError> {
        if !self.enabled {
            return Ok(());
        }
        self.current
            .record(phase, entity, progress, format_utc(Utc::now()));
        write_checkpoint(&self.path, &self.current)?;
        debug!(%phase, %entity, progress, path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    /// Delete the checkpoint file
    pub fn clear(&mut self) -> Result<(), CheckpointError> {
        self.current = Checkpoint::new();
        if !self.enabled || !self.path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let text = fs::read_to_string(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(Checkpoint::new());
    }
    serde_json::from_str(&text).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    let io_error = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let json = serde_json::to_string_pretty(checkpoint).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)
}
