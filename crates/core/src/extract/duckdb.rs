//! DuckDB source backend
//!
//! Reads a local DuckDB file directly, or attaches a legacy MySQL server
//! through DuckDB's `mysql` extension and queries it read-only.

use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, Value as DbValue};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

use super::source::{Row, SourceConnection, SqlQuery};
use crate::config::{SourceBackend, SourceConfig};
use crate::dates::{format_date, format_timestamp};
use crate::error::SourceError;

/// Schema name the MySQL database is attached under
const MYSQL_ALIAS: &str = "legacy";

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Relational source backed by DuckDB
pub struct DuckDbSource {
    conn: duckdb::Connection,
    description: String,
}

impl DuckDbSource {
    /// Open a database file
    pub fn open(path: &str) -> Result<Self, SourceError> {
        let conn = duckdb::Connection::open(path).map_err(connection_error)?;
        Ok(Self {
            conn,
            description: format!("duckdb:{path}"),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, SourceError> {
        let conn = duckdb::Connection::open_in_memory().map_err(connection_error)?;
        Ok(Self {
            conn,
            description: "duckdb:memory".to_string(),
        })
    }

    /// Connect according to the source configuration
    pub fn connect(config: &SourceConfig) -> Result<Self, SourceError> {
        match config.backend {
            SourceBackend::DuckDb => match &config.path {
                Some(path) => Self::open(&path.to_string_lossy()),
                None => Err(SourceError::Connection(
                    "source.path is required for the duckdb backend".to_string(),
                )),
            },
            SourceBackend::MySql => Self::attach_mysql(config),
        }
    }

    fn attach_mysql(config: &SourceConfig) -> Result<Self, SourceError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| SourceError::Connection("source.host is required for mysql".to_string()))?;
        let database = config.database.as_deref().ok_or_else(|| {
            SourceError::Connection("source.database is required for mysql".to_string())
        })?;

        let mut source = Self::in_memory()?;
        source
            .conn
            .execute_batch("INSTALL mysql; LOAD mysql;")
            .map_err(connection_error)?;

        let mut dsn = format!("host={} port={} database={}", host, config.port, database);
        if let Some(user) = &config.username {
            dsn.push_str(&format!(" user={user}"));
        }
        if let Some(password) = &config.password {
            dsn.push_str(&format!(" password={password}"));
        }
        if config.tls {
            dsn.push_str(" ssl_mode=required");
        }

        let attach = format!(
            "ATTACH '{}' AS {MYSQL_ALIAS} (TYPE mysql, READ_ONLY); USE {MYSQL_ALIAS};",
            dsn.replace('\'', "''")
        );
        source.conn.execute_batch(&attach).map_err(|e| {
            // The DSN carries the password; keep it out of the message
            SourceError::Connection(format!("attaching mysql://{host}:{}/{database}: {e}", config.port))
        })?;

        info!(host = %host, port = config.port, database = %database, "Attached MySQL source");
        source.description = format!("mysql://{host}:{}/{database}", config.port);
        Ok(source)
    }
}

impl SourceConnection for DuckDbSource {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn fetch(&mut self, query: &SqlQuery) -> Result<Vec<Row>, SourceError> {
        let sql = query.render();
        debug!(sql = %sql, params = query.params.len(), "Running source query");
        let query_error = |e: duckdb::Error| SourceError::Query {
            sql: sql.clone(),
            message: e.to_string(),
        };

        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let params = query.params.iter().map(to_db_value);
        let mut rows = stmt
            .query(duckdb::params_from_iter(params))
            .map_err(query_error)?;

        let column_count = rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let column_names: Vec<String> = (0..column_count)
            .map(|i| {
                rows.as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut results = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut obj = Map::new();
            for (i, name) in column_names.iter().enumerate() {
                let value: DbValue = row.get(i).map_err(query_error)?;
                obj.insert(name.clone(), to_json(value));
            }
            results.push(obj);
        }

        Ok(results)
    }

    fn count(&mut self, query: &SqlQuery) -> Result<u64, SourceError> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS src", query.render());
        let query_error = |e: duckdb::Error| SourceError::Query {
            sql: sql.clone(),
            message: e.to_string(),
        };

        let params = query.params.iter().map(to_db_value);
        let count: i64 = self
            .conn
            .query_row(&sql, duckdb::params_from_iter(params), |row| row.get(0))
            .map_err(query_error)?;
        Ok(count.max(0) as u64)
    }
}

fn connection_error(e: duckdb::Error) -> SourceError {
    SourceError::Connection(e.to_string())
}

fn to_db_value(value: &Value) -> DbValue {
    match value {
        Value::Null => DbValue::Null,
        Value::Bool(b) => DbValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DbValue::BigInt(i),
            None => DbValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => DbValue::Text(s.clone()),
        other => DbValue::Text(other.to_string()),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(n) => Value::Number(n.into()),
        DbValue::SmallInt(n) => Value::Number(n.into()),
        DbValue::Int(n) => Value::Number(n.into()),
        DbValue::BigInt(n) => Value::Number(n.into()),
        DbValue::UTinyInt(n) => Value::Number(n.into()),
        DbValue::USmallInt(n) => Value::Number(n.into()),
        DbValue::UInt(n) => Value::Number(n.into()),
        DbValue::UBigInt(n) => Value::Number(n.into()),
        DbValue::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(n.to_string()),
        },
        DbValue::Float(f) => float(f as f64),
        DbValue::Double(f) => float(f),
        // Decimals arrive as text and are coerced by the field tables
        DbValue::Decimal(d) => Value::String(d.to_string()),
        DbValue::Text(s) => Value::String(s),
        DbValue::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(|date| Value::String(format_date(date)))
            .unwrap_or(Value::Null),
        DbValue::Timestamp(unit, raw) => DateTime::from_timestamp_micros(micros(unit, raw))
            .map(|ts| Value::String(format_timestamp(ts.naive_utc())))
            .unwrap_or(Value::Null),
        other => Value::String(format!("{:?}", other)),
    }
}

fn micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> DuckDbSource {
        let source = DuckDbSource::in_memory().unwrap();
        source
            .conn
            .execute_batch(
                "CREATE TABLE msg (id INTEGER, totale DECIMAL(10,2), data DATE, stato VARCHAR);
                 INSERT INTO msg VALUES (1, 122.00, DATE '2024-03-15', 'Confermato'),
                                        (2, 50.50, NULL, NULL),
                                        (3, 10.00, DATE '2024-04-01', 'pagato');
                 CREATE TABLE msg_line (id INTEGER, msg_id INTEGER, line_number INTEGER);
                 INSERT INTO msg_line VALUES (10, 1, 1), (11, 1, 2), (12, 3, 1);",
            )
            .unwrap();
        source
    }

    #[test]
    fn test_fetch_converts_types() {
        let mut source = seeded();
        let rows = source
            .fetch(&SqlQuery::new("SELECT * FROM msg ORDER BY id"))
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["data"], json!("2024-03-15"));
        assert!(rows[0]["totale"].as_str().unwrap().starts_with("122"));
        assert_eq!(rows[1]["stato"], Value::Null);
    }

    #[test]
    fn test_count_honours_paging() {
        let mut source = seeded();
        let query = SqlQuery::new("SELECT * FROM msg ORDER BY id").with_paging(Some(2), 2);
        assert_eq!(source.count(&query).unwrap(), 1);
    }

    #[test]
    fn test_parametrized_lines() {
        let mut source = seeded();
        let query = SqlQuery::new("SELECT * FROM msg_line WHERE msg_id = ? ORDER BY line_number, id")
            .with_params(vec![json!(1)]);
        let rows = source.fetch(&query).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(11));
    }

    #[test]
    fn test_query_error_carries_sql() {
        let mut source = seeded();
        let err = source.fetch(&SqlQuery::new("SELECT * FROM missing")).unwrap_err();
        assert!(matches!(err, SourceError::Query { ref sql, .. } if sql.contains("missing")));
    }

    #[test]
    fn test_duckdb_backend_requires_path() {
        let err = DuckDbSource::connect(&SourceConfig::default()).err().unwrap();
        assert!(matches!(err, SourceError::Connection(_)));
    }
}
