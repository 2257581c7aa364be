//! Relational source seam

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use crate::config::SourceConfig;
use crate::error::SourceError;

/// One source row, keyed by column name
pub type Row = Map<String, Value>;

/// A parametrized statement with optional paging
///
/// Backends render `limit`/`offset` in their own dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_paging(mut self, limit: Option<u64>, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Statement text with a `LIMIT ... OFFSET ...` suffix
    pub fn render(&self) -> String {
        match (self.limit, self.offset) {
            (Some(limit), offset) => format!("{} LIMIT {} OFFSET {}", self.sql, limit, offset),
            (None, 0) => self.sql.clone(),
            (None, offset) => format!("{} OFFSET {}", self.sql, offset),
        }
    }
}

/// Connection to the relational source
pub trait SourceConnection {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Run a query and return all rows
    fn fetch(&mut self, query: &SqlQuery) -> Result<Vec<Row>, SourceError>;

    /// Number of rows the query returns, honouring paging
    fn count(&mut self, query: &SqlQuery) -> Result<u64, SourceError>;
}

/// Open the source connection described by the configuration
pub fn connect_source(config: &SourceConfig) -> Result<Box<dyn SourceConnection>, SourceError> {
    #[cfg(feature = "duckdb")]
    {
        let source = super::duckdb::DuckDbSource::connect(config)?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "duckdb"))]
    {
        Err(SourceError::Unsupported(format!(
            "{} (rebuild with the `duckdb` feature)",
            config.backend
        )))
    }
}

/// Kind of call recorded by [`StaticSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Fetch,
    Count,
}

type CannedKey = (String, String);

#[derive(Default)]
struct StaticState {
    results: HashMap<CannedKey, Vec<Row>>,
    log: Vec<(QueryKind, String)>,
}

/// Source answering from canned rows
///
/// Results are registered per statement text and parameters. Paging is
/// applied to the canned rows. Unregistered statements return no rows.
/// Clones share state, so a handle kept by a test can inspect the query log
/// after the source has been handed to an orchestrator.
#[derive(Clone, Default)]
pub struct StaticSource {
    state: Arc<Mutex<StaticState>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rows returned by a parameterless statement
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.with_rows_for(sql, Vec::new(), rows)
    }

    /// Register rows returned by a statement with specific parameters
    pub fn with_rows_for(self, sql: impl Into<String>, params: Vec<Value>, rows: Vec<Row>) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.results.insert(canned_key(&sql.into(), &params), rows);
        }
        self
    }

    /// Statements executed so far
    pub fn query_log(&self) -> Vec<(QueryKind, String)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.log.clone()
    }

    fn page(&self, query: &SqlQuery, kind: QueryKind) -> Vec<Row> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.log.push((kind, query.render()));

        let rows = state
            .results
            .get(&canned_key(&query.sql, &query.params))
            .cloned()
            .unwrap_or_default();

        let skipped = rows.into_iter().skip(query.offset as usize);
        match query.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        }
    }
}

fn canned_key(sql: &str, params: &[Value]) -> CannedKey {
    (sql.to_string(), Value::Array(params.to_vec()).to_string())
}

impl SourceConnection for StaticSource {
    fn describe(&self) -> String {
        "static rows".to_string()
    }

    fn fetch(&mut self, query: &SqlQuery) -> Result<Vec<Row>, SourceError> {
        Ok(self.page(query, QueryKind::Fetch))
    }

    fn count(&mut self, query: &SqlQuery) -> Result<u64, SourceError> {
        Ok(self.page(query, QueryKind::Count).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_paging() {
        let query = SqlQuery::new("SELECT * FROM msg");
        assert_eq!(query.render(), "SELECT * FROM msg");
        assert_eq!(
            query.clone().with_paging(Some(10), 20).render(),
            "SELECT * FROM msg LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            query.with_paging(None, 5).render(),
            "SELECT * FROM msg OFFSET 5"
        );
    }

    #[test]
    fn test_static_source_paging_and_log() {
        let rows = (1..=5).map(|i| row(json!({"id": i}))).collect();
        let mut source = StaticSource::new().with_rows("SELECT * FROM msg", rows);
        let handle = source.clone();

        let query = SqlQuery::new("SELECT * FROM msg").with_paging(Some(2), 1);
        let fetched = source.fetch(&query).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0]["id"], json!(2));
        assert_eq!(source.count(&query).unwrap(), 2);

        let log = handle.query_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, QueryKind::Fetch);
        assert_eq!(log[1].0, QueryKind::Count);
    }

    #[test]
    fn test_static_source_params() {
        let mut source = StaticSource::new().with_rows_for(
            "SELECT * FROM msg_line WHERE msg_id = ?",
            vec![json!(7)],
            vec![row(json!({"id": 1, "msg_id": 7}))],
        );

        let hit = SqlQuery::new("SELECT * FROM msg_line WHERE msg_id = ?").with_params(vec![json!(7)]);
        let miss = SqlQuery::new("SELECT * FROM msg_line WHERE msg_id = ?").with_params(vec![json!(8)]);
        assert_eq!(source.fetch(&hit).unwrap().len(), 1);
        assert!(source.fetch(&miss).unwrap().is_empty());
    }

    #[cfg(not(feature = "duckdb"))]
    #[test]
    fn test_connect_without_backend() {
        let err = connect_source(&SourceConfig::default()).err().unwrap();
        assert!(matches!(err, SourceError::Unsupported(_)));
    }
}
