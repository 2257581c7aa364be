//! Migration configuration
//!
//! Configuration is read from a TOML file. `${VAR}` placeholders are replaced
//! with environment variables before parsing so credentials can stay out of
//! the file. Every section is optional and falls back to defaults.
//!
//! ```toml
//! [source]
//! backend = "mysql"
//! host = "legacy-db.internal"
//! database = "sales"
//! username = "migration"
//! password = "${LEGACY_DB_PASSWORD}"
//!
//! [target]
//! table = "sales-migration"
//! region = "eu-south-1"
//!
//! [migration]
//! batch_size = 25
//! continue_on_error = false
//! ```

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};
use crate::load::MAX_BATCH_SIZE;
use crate::model::Entity;

pub const DEFAULT_BUYERS_QUERY: &str = "SELECT * FROM msg_anag WHERE kind IN (2, 3) AND enabled = 1";
pub const DEFAULT_PRODUCERS_QUERY: &str = "SELECT * FROM msg_anag WHERE kind = 1 AND enabled = 1";
pub const DEFAULT_SALES_QUERY: &str = "SELECT * FROM msg WHERE enabled = 1";
pub const DEFAULT_LINES_QUERY: &str = "SELECT * FROM msg_line WHERE msg_id = ? ORDER BY line_number, id";

static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Complete migration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub source: SourceConfig,
    pub extraction: ExtractionConfig,
    pub target: TargetConfig,
    pub migration: MigrationOptions,
    pub checkpoint: CheckpointConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

impl MigrationConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> MigrationResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::io_with_path(path, "reading configuration file", e)
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text, expanding environment placeholders
    pub fn from_toml_str(text: &str) -> MigrationResult<Self> {
        let expanded = expand_env(text);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| MigrationError::Config(e.to_string()))?;
        config.validate().map_err(MigrationError::Config)?;
        Ok(config)
    }

    /// Set the directory holding intermediate artifacts
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths.data_dir = dir.into();
        self
    }

    /// Set the checkpoint file
    pub fn with_checkpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint.file = path.into();
        self
    }

    /// Enable or disable checkpointing
    pub fn with_checkpoint_enabled(mut self, enabled: bool) -> Self {
        self.checkpoint.enabled = enabled;
        self
    }

    /// Set the load batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.migration.batch_size = size;
        self
    }

    /// Set dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.migration.dry_run = dry_run;
        self
    }

    /// Set continue-on-error mode
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.migration.continue_on_error = continue_on_error;
        self
    }

    /// Enable or disable the verify phase
    pub fn with_validate_after_load(mut self, enabled: bool) -> Self {
        self.migration.validate_after_load = enabled;
        self
    }

    /// Enable or disable the pre-load backup
    pub fn with_backup_before_load(mut self, enabled: bool) -> Self {
        self.migration.backup_before_load = enabled;
        self
    }

    /// Set the tolerance for the sale total check
    pub fn with_total_tolerance(mut self, tolerance: f64) -> Self {
        self.migration.total_tolerance = tolerance;
        self
    }

    /// Set the target table shared by all entities
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.target.table = table.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let batch_size = self.migration.batch_size;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "migration.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
            ));
        }

        let tolerance = self.migration.total_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(format!(
                "migration.total_tolerance must be a non-negative number, got {tolerance}"
            ));
        }

        let tax_rate = self.migration.default_tax_rate;
        if !(0.0..=100.0).contains(&tax_rate) {
            return Err(format!(
                "migration.default_tax_rate must be between 0 and 100, got {tax_rate}"
            ));
        }

        if self.migration.migration_user.trim().is_empty() {
            return Err("migration.migration_user cannot be empty".to_string());
        }

        for entity in Entity::all() {
            if self.target.table_for(entity).trim().is_empty() {
                return Err(format!("no target table configured for {entity}"));
            }
            if self.extraction.query_for(entity).trim().is_empty() {
                return Err(format!("extraction query for {entity} cannot be empty"));
            }
        }

        if self.checkpoint.enabled && self.checkpoint.file.as_os_str().is_empty() {
            return Err("checkpoint.file cannot be empty when checkpointing is enabled".to_string());
        }

        Ok(())
    }

    /// Annotated example configuration
    pub fn example() -> &'static str {
        EXAMPLE_CONFIG
    }
}

/// Relational source backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    /// Local DuckDB database file
    #[default]
    DuckDb,
    /// MySQL server, attached through DuckDB's MySQL scanner
    MySql,
}

impl std::fmt::Display for SourceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuckDb => write!(f, "duckdb"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}

/// Source connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub backend: SourceBackend,
    /// Database file for the `duckdb` backend
    pub path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: SourceBackend::default(),
            path: None,
            host: None,
            port: 3306,
            database: None,
            username: None,
            password: None,
            tls: false,
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Query settings for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityExtraction {
    /// Overrides the default query for the entity
    pub query: Option<String>,
    pub limit: Option<u64>,
    pub offset: u64,
    /// Sales only: query fetching the lines of one sale
    pub lines_query: Option<String>,
    /// Sales only: whether lines are fetched at all
    pub include_lines: bool,
}

impl Default for EntityExtraction {
    fn default() -> Self {
        Self {
            query: None,
            limit: None,
            offset: 0,
            lines_query: None,
            include_lines: true,
        }
    }
}

/// Per-entity extraction settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub buyers: EntityExtraction,
    pub producers: EntityExtraction,
    pub sales: EntityExtraction,
}

impl ExtractionConfig {
    pub fn for_entity(&self, entity: Entity) -> &EntityExtraction {
        match entity {
            Entity::Buyers => &self.buyers,
            Entity::Producers => &self.producers,
            Entity::Sales => &self.sales,
        }
    }

    /// Query used for an entity, falling back to the legacy schema default
    pub fn query_for(&self, entity: Entity) -> &str {
        let default = match entity {
            Entity::Buyers => DEFAULT_BUYERS_QUERY,
            Entity::Producers => DEFAULT_PRODUCERS_QUERY,
            Entity::Sales => DEFAULT_SALES_QUERY,
        };
        self.for_entity(entity).query.as_deref().unwrap_or(default)
    }

    /// Query fetching the lines of one sale; takes the sale id as its only parameter
    pub fn lines_query(&self) -> &str {
        self.sales.lines_query.as_deref().unwrap_or(DEFAULT_LINES_QUERY)
    }
}

/// Target store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Table shared by all entity kinds
    pub table: String,
    pub buyers_table: Option<String>,
    pub producers_table: Option<String>,
    pub sales_table: Option<String>,
    pub region: Option<String>,
    /// Endpoint override (local emulators)
    pub endpoint: Option<String>,
    pub profile: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            table: "sales-migration".to_string(),
            buyers_table: None,
            producers_table: None,
            sales_table: None,
            region: None,
            endpoint: None,
            profile: None,
        }
    }
}

impl TargetConfig {
    /// Table an entity is loaded into
    pub fn table_for(&self, entity: Entity) -> &str {
        let table = match entity {
            Entity::Buyers => &self.buyers_table,
            Entity::Producers => &self.producers_table,
            Entity::Sales => &self.sales_table,
        };
        table.as_deref().unwrap_or(&self.table)
    }
}

/// Run behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Items per write call, at most 25
    pub batch_size: usize,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub backup_before_load: bool,
    /// Run the verify phase after loading
    pub validate_after_load: bool,
    /// Written to createdBy/updatedBy
    pub migration_user: String,
    /// Tax rate for lines that carry none, in percent
    pub default_tax_rate: f64,
    /// Absolute tolerance of the sale total check
    pub total_tolerance: f64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            dry_run: false,
            continue_on_error: false,
            backup_before_load: false,
            validate_after_load: true,
            migration_user: "migration".to_string(),
            default_tax_rate: 22.0,
            total_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub file: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("data/checkpoint.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console: bool,
    /// JSON-lines log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of extracted/, transformed/, reports/ and backups/
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Replace `${VAR}` placeholders with environment variables
///
/// Unknown variables are left untouched.
pub fn expand_env(text: &str) -> String {
    expand_env_with(text, |name| std::env::var(name).ok())
}

/// Replace `${VAR}` placeholders using a lookup function
pub fn expand_env_with(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

const EXAMPLE_CONFIG: &str = r#"# Sale migration configuration

[source]
# "duckdb" reads a local database file, "mysql" attaches a MySQL server
backend = "mysql"
host = "localhost"
port = 3306
database = "sales"
username = "migration"
password = "${LEGACY_DB_PASSWORD}"
tls = false

[extraction.buyers]
# query = "SELECT * FROM msg_anag WHERE kind IN (2, 3) AND enabled = 1"
# limit = 100
offset = 0

[extraction.producers]
offset = 0

[extraction.sales]
include_lines = true
# lines_query = "SELECT * FROM msg_line WHERE msg_id = ? ORDER BY line_number, id"

[target]
table = "sales-migration"
region = "eu-south-1"
# endpoint = "http://localhost:8000"

[migration]
batch_size = 25
dry_run = false
continue_on_error = false
backup_before_load = true
validate_after_load = true
migration_user = "migration"
default_tax_rate = 22.0
total_tolerance = 0.01

[checkpoint]
enabled = true
file = "data/checkpoint.json"

[logging]
level = "info"
console = true
# file = "data/migration.log"

[paths]
data_dir = "data"
"#;
