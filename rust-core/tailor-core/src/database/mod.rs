//! # Database Module
//!
//! The contract every database driver implements, and the values that cross
//! it.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Drivers only marshal values, they never interpret rows
//! - **O**: New backends plug in through [`DriverRegistry`]
//! - **D**: Handlers depend on [`DatabaseDriver`], never on a concrete driver
//!
//! Query failures are data: `execute_query` always returns rows, and a failed
//! query returns exactly one row whose `error` is set.

pub mod mysql;
pub mod registry;
pub mod sqlite;

use crate::config::DatabaseConfig;
use crate::time::TimeZone;
use crate::value::Value;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use mysql::MysqlConnection;
pub use registry::DriverRegistry;
pub use sqlite::SqliteConnection;

/// One fetched record, or one error marker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    /// Column name to value
    pub data: HashMap<String, Value>,
    /// Set when this row reports a failed query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Row {
    /// A data row
    #[must_use]
    pub const fn new(data: HashMap<String, Value>) -> Self {
        Self { data, error: None }
    }

    /// An error row with no data
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: HashMap::new(),
            error: Some(message.into()),
        }
    }

    /// The synthetic row an insert returns
    #[must_use]
    pub fn inserted_id(id: i64) -> Self {
        let mut data = HashMap::with_capacity(1);
        data.insert("id".to_string(), Value::Integer(id));
        Self::new(data)
    }

    /// Value of a column
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    /// Whether this row reports a failure
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Column names, sorted
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterate over column/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }
}

/// Lifecycle of a prepared statement
///
/// ```text
/// Created -> Ready -> HasResults | HasError -> Done -> Closed
///        \-> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Not yet prepared
    Created,
    /// Prepared and waiting for parameters
    Ready,
    /// Executed, rows are available
    HasResults,
    /// Executed, the database reported a failure
    HasError,
    /// Every row has been fetched
    Done,
    /// Native resources released
    Closed,
    /// Preparation failed
    Error,
}

impl StatementState {
    /// Whether the statement can still run
    #[must_use]
    pub const fn can_execute(self) -> bool {
        matches!(self, Self::Ready | Self::Done)
    }
}

/// Abstract interface to a database
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// The time zone values are normalized to
    fn time_zone(&self) -> TimeZone;

    /// Run a query with positional parameters
    ///
    /// Returns one row per record for queries that produce rows, a single
    /// row holding `id` for inserts, an empty list for other statements, and
    /// a single error row when the query fails.
    async fn execute_query(&self, query: &str, parameters: &[Value]) -> Vec<Row>;

    /// Table name to creation DDL
    async fn tables(&self) -> HashMap<String, String>;

    /// Sorted table names
    async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables().await.into_keys().collect();
        names.sort();
        names
    }

    /// Strip a column name down to letters, digits and underscores
    fn sanitize_column_name(&self, name: &str) -> String {
        sanitize_column_name(name)
    }

    /// Short name used in logs
    fn driver_name(&self) -> &'static str;

    /// Release pooled connections
    async fn close(&self) {}
}

/// Keep only `[A-Za-z0-9_]`
#[must_use]
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Whether a query is an insert (case-insensitive prefix check)
#[must_use]
pub fn is_insert_query(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("insert"))
}

/// Per-connection query behavior taken from configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct QuerySettings {
    /// Log every query at info level instead of debug
    pub log_queries: bool,
    /// Abandon queries that run longer than this
    pub timeout: Option<Duration>,
}

impl QuerySettings {
    /// Settings from the database configuration section
    #[must_use]
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            log_queries: config.log_queries,
            timeout: config.query_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Run one query, logging it and applying the timeout
    pub(crate) async fn run<F>(
        &self,
        driver: &'static str,
        query: &str,
        parameter_count: usize,
        execution: F,
    ) -> Vec<Row>
    where
        F: Future<Output = Vec<Row>> + Send,
    {
        if self.log_queries {
            info!(driver, query, parameters = parameter_count, "Executing query");
        } else {
            debug!(driver, query, parameters = parameter_count, "Executing query");
        }

        let rows = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(rows) => rows,
                Err(_) => vec![Row::error(format!(
                    "Query timed out after {}ms",
                    limit.as_millis()
                ))],
            },
            None => execution.await,
        };

        if let Some(message) = rows.first().and_then(|row| row.error.as_deref()) {
            warn!(driver, query, error = message, "Query failed");
        }
        rows
    }
}

/// Convert a table listing query result into a name to DDL map
fn collect_tables(rows: Vec<Row>, name_column: &str, sql_column: &str) -> HashMap<String, String> {
    rows.into_iter()
        .filter(|row| !row.is_error())
        .filter_map(|row| {
            let name = row.get(name_column)?.as_str()?.to_string();
            let sql = row
                .get(sql_column)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some((name, sql))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_detection() {
        assert!(is_insert_query("INSERT INTO hats (color) VALUES (?)"));
        assert!(is_insert_query("  insert into hats default values"));
        assert!(is_insert_query("InSeRt INTO hats"));
        assert!(!is_insert_query("SELECT * FROM hats"));
        assert!(!is_insert_query("ins"));
        assert!(!is_insert_query(""));
    }

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("brim_size; DROP TABLE"), "brim_sizeDROPTABLE");
        assert_eq!(sanitize_column_name("`color`"), "color");
    }

    #[test]
    fn test_row_helpers() {
        let row = Row::inserted_id(7);
        assert_eq!(row.get("id"), Some(&Value::Integer(7)));
        assert_eq!(row.columns(), vec!["id"]);
        assert!(!row.is_error());

        let failed = Row::error("no such table: hats");
        assert!(failed.is_error());
        assert!(failed.data.is_empty());
    }

    #[test]
    fn test_row_serializes_without_empty_error() {
        let json = serde_json::to_string(&Row::inserted_id(1)).unwrap();
        assert_eq!(json, r#"{"data":{"id":1}}"#);
    }

    #[test]
    fn test_statement_state_execution() {
        assert!(StatementState::Ready.can_execute());
        assert!(StatementState::Done.can_execute());
        assert!(!StatementState::Closed.can_execute());
        assert!(!StatementState::Error.can_execute());
    }

    #[tokio::test]
    async fn test_query_timeout_becomes_error_row() {
        let settings = QuerySettings {
            log_queries: false,
            timeout: Some(Duration::from_millis(10)),
        };
        let rows = settings
            .run("test", "SELECT 1", 0, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Vec::new()
            })
            .await;
        assert_eq!(rows, vec![Row::error("Query timed out after 10ms")]);
    }

    #[test]
    fn test_collect_tables_skips_error_rows() {
        let mut data = HashMap::new();
        data.insert("tbl_name".to_string(), Value::from("hats"));
        data.insert("sql".to_string(), Value::from("CREATE TABLE hats (id integer)"));
        let tables = collect_tables(
            vec![Row::new(data), Row::error("boom")],
            "tbl_name",
            "sql",
        );
        assert_eq!(tables.len(), 1);
        assert_eq!(tables["hats"], "CREATE TABLE hats (id integer)");
    }
}
