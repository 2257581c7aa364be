//! Phase orchestration
//!
//! Phases run in a fixed order and, inside a phase, entities run one after
//! another in dependency order (buyers, producers, sales). An entity's
//! checkpoint is saved as soon as it succeeds, before any later failure is
//! surfaced, so a resumed run never redoes completed work.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use super::artifacts::{ArtifactStore, TransformedRecords};
use super::checkpoint::{Checkpoint, CheckpointStore};
use super::report::{EntityOutcome, MigrationReport, OutcomeStatus, RunStatus};
use super::verify::verify_entity;
use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
use crate::context::{CancellationToken, MigrationContext};
use crate::dates::format_utc;
use crate::error::{ExtractionError, LoadError, MigrationError, MigrationResult, ValidationError};
use crate::extract::{ExtractedRecords, Extractor, SourceConnection, connect_source};
use crate::load::{self, Loader, TargetStore, connect_target};
use crate::model::{Entity, Phase};
use crate::progress::ProgressTracker;
use crate::transform::{IdGenerator, PartyIndex, TransformOptions, Transformer, UuidGenerator};
use crate::validate::{ValidationReport, Validator};

/// Where the orchestrator is in the pipeline
///
/// `Failed` is absorbing: once entered, the run does not execute further phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Extract,
    Transform,
    Validate,
    Load,
    Verify,
    Done,
    Failed,
}

impl From<Phase> for PipelineState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Extract => Self::Extract,
            Phase::Transform => Self::Transform,
            Phase::Validate => Self::Validate,
            Phase::Load => Self::Load,
            Phase::Verify => Self::Verify,
        }
    }
}

#[derive(Default)]
struct RunLog {
    phases: Vec<Phase>,
    outcomes: Vec<EntityOutcome>,
    validation: Option<ValidationReport>,
    started: Option<Instant>,
    cancelled: bool,
}

/// Runs the migration phases against a source and a target
pub struct Orchestrator {
    config: MigrationConfig,
    entities: Vec<Entity>,
    source: Option<Box<dyn SourceConnection>>,
    target: Option<Box<dyn TargetStore>>,
    ids: Box<dyn IdGenerator>,
    checkpoints: CheckpointStore,
    artifacts: ArtifactStore,
    ctx: MigrationContext,
    state: PipelineState,
    run: RunLog,
}

impl Orchestrator {
    /// Create an orchestrator; source and target connect on first use
    pub fn new(config: MigrationConfig) -> MigrationResult<Self> {
        config.validate().map_err(MigrationError::Config)?;

        let ctx = MigrationContext::new(config.migration.dry_run, config.migration.continue_on_error);
        Ok(Self {
            entities: Entity::all(),
            source: None,
            target: None,
            ids: Box::new(UuidGenerator),
            checkpoints: CheckpointStore::new(&config.checkpoint),
            artifacts: ArtifactStore::new(&config.paths.data_dir),
            ctx,
            state: PipelineState::Extract,
            run: RunLog::default(),
            config,
        })
    }

    pub fn with_source(mut self, source: Box<dyn SourceConnection>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_target(mut self, target: Box<dyn TargetStore>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Restrict every operation to one entity
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities = vec![entity];
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx = std::mem::take(&mut self.ctx).with_cancellation(token);
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.ctx = std::mem::take(&mut self.ctx).with_progress(progress);
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        self.checkpoints.current()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run every phase from extraction
    ///
    /// Any earlier checkpoint is discarded. On full success the checkpoint
    /// file is deleted.
    pub fn run_full(&mut self) -> MigrationResult<MigrationReport> {
        if !self.ctx.dry_run {
            self.checkpoints.clear()?;
        }
        let phases = self.phases_from(Phase::Extract);
        self.execute(&phases, false, true)
    }

    /// Continue from the first phase the checkpoint does not cover
    ///
    /// Entities already checkpointed in that phase are skipped. When every
    /// checkpointed phase is complete only verification runs.
    pub fn resume(&mut self) -> MigrationResult<MigrationReport> {
        let next = self.checkpoints.load()?.next_phase(&self.entities);
        let phases = match next {
            Some(phase) => {
                info!(phase = phase.name(), "Resuming migration");
                self.phases_from(phase)
            }
            None => {
                info!("All checkpointed phases are complete");
                self.verify_phase().into_iter().collect()
            }
        };
        self.execute(&phases, true, true)
    }

    /// Run a single phase for the selected entities
    ///
    /// Checkpoint entries are written, but the checkpoint is never cleared.
    pub fn run_phase(&mut self, phase: Phase) -> MigrationResult<MigrationReport> {
        self.checkpoints.load()?;
        self.execute(&[phase], false, false)
    }

    /// Report of the current or last run
    pub fn report(&self) -> MigrationReport {
        let failed = self
            .run
            .outcomes
            .iter()
            .any(|o| o.status == OutcomeStatus::Failed);
        let status = match self.state {
            PipelineState::Failed if self.run.cancelled => RunStatus::Cancelled,
            PipelineState::Failed => RunStatus::Failed,
            _ if failed => RunStatus::CompletedWithErrors,
            _ => RunStatus::Completed,
        };

        MigrationReport {
            run_id: self.ctx.run_id.clone(),
            status,
            dry_run: self.ctx.dry_run,
            phases: self.run.phases.clone(),
            outcomes: self.run.outcomes.clone(),
            duration_ms: self
                .run
                .started
                .map_or(0, |started| started.elapsed().as_millis() as u64),
            validation: self.run.validation.clone(),
        }
    }

    fn phases_from(&self, first: Phase) -> Vec<Phase> {
        Phase::checkpointed()
            .into_iter()
            .filter(|phase| phase.index() >= first.index())
            .chain(self.verify_phase())
            .collect()
    }

    fn verify_phase(&self) -> Option<Phase> {
        self.config
            .migration
            .validate_after_load
            .then_some(Phase::Verify)
    }

    fn execute(
        &mut self,
        phases: &[Phase],
        skip_completed: bool,
        clear_on_success: bool,
    ) -> MigrationResult<MigrationReport> {
        let _run_span = info_span!(
            "migration_run",
            run_id = %self.ctx.run_id,
            dry_run = self.ctx.dry_run
        )
        .entered();

        self.run = RunLog {
            phases: phases.to_vec(),
            started: Some(Instant::now()),
            ..RunLog::default()
        };
        info!(
            phases = ?phases.iter().map(|p| p.name()).collect::<Vec<_>>(),
            entities = ?self.entities.iter().map(|e| e.name()).collect::<Vec<_>>(),
            dry_run = self.ctx.dry_run,
            continue_on_error = self.ctx.continue_on_error,
            "Starting migration"
        );
        if self.ctx.dry_run {
            info!("DRY RUN MODE - no changes will be made");
        }

        for &phase in phases {
            self.state = phase.into();
            let _phase_span = info_span!("phase", phase = phase.name()).entered();
            info!(description = phase.description(), "Starting phase");

            if phase == Phase::Load {
                if let Err(err) = self.backup_before_load() {
                    return Err(self.fail(err));
                }
            }

            for entity in self.entities.clone() {
                if self.ctx.is_cancelled() {
                    return Err(self.cancel());
                }

                if skip_completed && phase.is_checkpointed() {
                    if let Some(entry) = self.checkpoints.current().entry(phase, entity) {
                        debug!(%entity, "Already checkpointed, skipping");
                        let progress = entry.progress;
                        self.record(phase, entity, OutcomeStatus::Skipped, progress, None);
                        continue;
                    }
                }

                let _entity_span = info_span!("entity", entity = entity.name()).entered();
                match self.run_entity(phase, entity) {
                    Ok(count) => {
                        if phase.is_checkpointed() && !self.ctx.dry_run {
                            if let Err(err) = self.checkpoints.save(phase, entity, count) {
                                return Err(self.fail(err.into()));
                            }
                        }
                        let status = if self.ctx.dry_run {
                            OutcomeStatus::Planned
                        } else {
                            OutcomeStatus::Succeeded
                        };
                        self.record(phase, entity, status, count, None);
                    }
                    Err(err) if err.is_cancelled() => return Err(self.cancel()),
                    Err(err) => {
                        let err = err.in_entity(phase, entity);
                        self.record(phase, entity, OutcomeStatus::Failed, 0, Some(err.to_string()));
                        if !self.ctx.continue_on_error {
                            error!(error = %err, "Entity failed, stopping");
                            return Err(self.fail(err));
                        }
                        error!(error = %err, "Entity failed, continuing");
                    }
                }
            }
        }

        self.state = PipelineState::Done;
        let report = self.report();
        if clear_on_success && report.status == RunStatus::Completed && !self.ctx.dry_run {
            self.checkpoints.clear()?;
        }

        info!(
            status = %report.status,
            duration_ms = report.duration_ms,
            failures = report.failures().count(),
            "Migration finished"
        );
        Ok(report)
    }

    fn record(
        &mut self,
        phase: Phase,
        entity: Entity,
        status: OutcomeStatus,
        count: u64,
        error: Option<String>,
    ) {
        self.run.outcomes.push(EntityOutcome {
            phase,
            entity,
            status,
            count,
            error,
        });
    }

    fn fail(&mut self, err: MigrationError) -> MigrationError {
        self.state = PipelineState::Failed;
        err
    }

    fn cancel(&mut self) -> MigrationError {
        warn!("Migration interrupted, stopping after the last completed entity");
        self.state = PipelineState::Failed;
        self.run.cancelled = true;
        MigrationError::Cancelled
    }

    fn run_entity(&mut self, phase: Phase, entity: Entity) -> MigrationResult<u64> {
        match phase {
            Phase::Extract => self.extract(entity),
            Phase::Transform => self.transform(entity),
            Phase::Validate => self.validate(entity),
            Phase::Load => self.load(entity),
            Phase::Verify => self.verify(entity),
        }
    }

    fn extract(&mut self, entity: Entity) -> MigrationResult<u64> {
        let source = connected_source(&mut self.source, &self.config.source)?;
        let mut extractor = Extractor::new(source.as_mut(), &self.config.extraction);

        if self.ctx.dry_run {
            let count = extractor.count(entity)?;
            info!(%entity, count, "Dry run: would extract records");
            return Ok(count);
        }

        let records = extractor.extract(entity, &self.ctx)?;
        let path = self.artifacts.write_extracted(&records)?;
        info!(%entity, count = records.len(), path = %path.display(), "Extracted records");
        Ok(records.len() as u64)
    }

    fn transform(&mut self, entity: Entity) -> MigrationResult<u64> {
        if self.ctx.dry_run {
            let path = self.artifacts.extracted_path(entity);
            if !path.exists() {
                info!(%entity, "Dry run: nothing extracted yet to transform");
                return Ok(0);
            }
            let count = self.artifacts.read_extracted(entity)?.len() as u64;
            info!(%entity, count, "Dry run: would transform records");
            return Ok(count);
        }

        let records = self.artifacts.read_extracted(entity)?;
        let parties = match entity {
            Entity::Sales => self.party_index()?,
            _ => PartyIndex::new(),
        };
        let options = TransformOptions::new(&self.config.migration, self.ctx.started_at);
        let mut transformer = Transformer::new(self.ids.as_mut(), &options);

        let transformed = match records {
            ExtractedRecords::Buyers(buyers) => TransformedRecords::Parties(
                Entity::Buyers,
                transformer.transform_buyers(&buyers, &self.ctx)?,
            ),
            ExtractedRecords::Producers(producers) => TransformedRecords::Parties(
                Entity::Producers,
                transformer.transform_producers(&producers, &self.ctx)?,
            ),
            ExtractedRecords::Sales(sales) => {
                TransformedRecords::Sales(transformer.transform_sales(&sales, &parties, &self.ctx)?)
            }
        };

        let path = self.artifacts.write_transformed(&transformed)?;
        info!(%entity, count = transformed.record_count(), path = %path.display(), "Wrote transformed records");
        Ok(transformed.record_count() as u64)
    }

    /// Index of the transformed parties sales refer to
    fn party_index(&self) -> MigrationResult<PartyIndex> {
        let mut index = PartyIndex::new();
        for party in [Entity::Buyers, Entity::Producers] {
            match self.artifacts.read_parties_if_present(party)? {
                Some(items) => index.insert_items(party, &items),
                None => warn!(entity = %party, "No transformed records, references stay unresolved"),
            }
        }
        Ok(index)
    }

    fn validate(&mut self, entity: Entity) -> MigrationResult<u64> {
        if self.ctx.dry_run {
            return self.planned_from_transformed(entity, "validate");
        }

        let records = self.artifacts.read_transformed(entity)?;
        let validator = Validator::new(self.config.migration.total_tolerance);
        let result = match &records {
            TransformedRecords::Parties(party, items) => validator.validate_parties(*party, items),
            TransformedRecords::Sales(sales) => validator.validate_sales(sales),
        };

        let report = self
            .run
            .validation
            .get_or_insert_with(|| ValidationReport::new(format_utc(Utc::now())));
        report.add(&result);
        let path = self.artifacts.write_report(report)?;
        debug!(path = %path.display(), "Validation report written");

        if result.has_errors() {
            return Err(ValidationError::Failed {
                entity,
                errors: result.errors.len(),
                warnings: result.warnings.len(),
                invalid: result.stats.invalid,
            }
            .into());
        }
        Ok(result.stats.count as u64)
    }

    fn load(&mut self, entity: Entity) -> MigrationResult<u64> {
        let batch_size = self.config.migration.batch_size;
        let table = self.config.target.table_for(entity).to_string();

        if self.ctx.dry_run {
            let path = self.artifacts.transformed_path(entity);
            if !path.exists() {
                info!(%entity, table = %table, "Dry run: nothing transformed yet to load");
                return Ok(0);
            }
            let items = self.artifacts.read_transformed(entity)?.into_items();
            let plan = load::plan(&items, batch_size);
            info!(
                %entity,
                table = %table,
                records = plan.records,
                lines = plan.lines,
                items = plan.items,
                batches = plan.batches,
                "Dry run: would write items"
            );
            return Ok(plan.records as u64);
        }

        let items = self.artifacts.read_transformed(entity)?.into_items();
        let target = connected_target(&mut self.target, &self.config.target)?;
        let stats = Loader::new(target.as_mut(), batch_size).load(&table, &items, &self.ctx)?;
        info!(
            %entity,
            table = %table,
            records = stats.records,
            items = stats.items,
            batches = stats.batches,
            "Loaded items"
        );
        Ok(stats.records as u64)
    }

    fn verify(&mut self, entity: Entity) -> MigrationResult<u64> {
        if self.ctx.dry_run {
            return self.planned_from_transformed(entity, "verify");
        }

        let expected = self.artifacts.read_transformed(entity)?.record_count() as u64;
        let table = self.config.target.table_for(entity).to_string();
        let target = connected_target(&mut self.target, &self.config.target)?;
        Ok(verify_entity(target.as_mut(), &table, entity, expected)?)
    }

    fn planned_from_transformed(&self, entity: Entity, action: &str) -> MigrationResult<u64> {
        let path = self.artifacts.transformed_path(entity);
        if !path.exists() {
            info!(%entity, action, "Dry run: nothing transformed yet");
            return Ok(0);
        }
        let count = self.artifacts.read_transformed(entity)?.record_count() as u64;
        info!(%entity, action, count, "Dry run: would process records");
        Ok(count)
    }

    /// Copy the transformed artifacts aside before the first write
    fn backup_before_load(&self) -> MigrationResult<()> {
        if !self.config.migration.backup_before_load || self.ctx.dry_run {
            return Ok(());
        }
        let label = self.ctx.started_at.format("%Y%m%dT%H%M%SZ").to_string();
        let (dir, copied) = self.artifacts.backup_transformed(&label, &self.entities)?;
        info!(path = %dir.display(), files = copied, "Backed up transformed data");
        Ok(())
    }
}

fn connected_source<'a>(
    slot: &'a mut Option<Box<dyn SourceConnection>>,
    config: &SourceConfig,
) -> MigrationResult<&'a mut Box<dyn SourceConnection>> {
    if slot.is_none() {
        let source = connect_source(config).map_err(ExtractionError::from)?;
        info!(source = %source.describe(), "Connected to source");
        *slot = Some(source);
    }
    slot.as_mut()
        .ok_or_else(|| MigrationError::Config("no source connection".to_string()))
}

fn connected_target<'a>(
    slot: &'a mut Option<Box<dyn TargetStore>>,
    config: &TargetConfig,
) -> MigrationResult<&'a mut Box<dyn TargetStore>> {
    if slot.is_none() {
        let target = connect_target(config).map_err(LoadError::from)?;
        info!(target = %target.describe(), "Connected to target");
        *slot = Some(target);
    }
    slot.as_mut()
        .ok_or_else(|| MigrationError::Config("no target store".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::StaticSource;
    use crate::load::MemoryTarget;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MigrationConfig {
        MigrationConfig::new()
            .with_data_dir(dir.path().join("data"))
            .with_checkpoint_file(dir.path().join("checkpoint.json"))
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Orchestrator::new(config(&dir).with_batch_size(26));
        assert!(matches!(result, Err(MigrationError::Config(_))));
    }

    #[test]
    fn test_phases_from() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(config(&dir).with_validate_after_load(true)).unwrap();
        assert_eq!(
            orchestrator.phases_from(Phase::Validate),
            vec![Phase::Validate, Phase::Load, Phase::Verify]
        );

        let orchestrator = Orchestrator::new(config(&dir).with_validate_after_load(false)).unwrap();
        assert_eq!(orchestrator.phases_from(Phase::Extract), Phase::checkpointed());
    }

    #[test]
    fn test_empty_source_completes() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let mut orchestrator = Orchestrator::new(config(&dir))
            .unwrap()
            .with_source(Box::new(StaticSource::new()))
            .with_target(Box::new(target.clone()));

        let report = orchestrator.run_full().unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(orchestrator.state(), PipelineState::Done);
        assert!(orchestrator.checkpoint().is_empty());
        assert!(!dir.path().join("checkpoint.json").exists());
        assert_eq!(target.batch_sizes(), Vec::<usize>::new());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut orchestrator = Orchestrator::new(config(&dir))
            .unwrap()
            .with_source(Box::new(StaticSource::new()))
            .with_target(Box::new(MemoryTarget::new()))
            .with_cancellation(token);

        let err = orchestrator.run_full().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(orchestrator.state(), PipelineState::Failed);
        assert_eq!(orchestrator.report().status, RunStatus::Cancelled);
    }
}
