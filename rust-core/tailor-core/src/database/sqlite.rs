//! # SQLite Driver
//!
//! Prepared statements over an sqlx SQLite pool.
//!
//! Inputs bind natively where SQLite has a storage class for them (integer,
//! real, text, blob, null). Booleans bind as 0/1 and temporal values bind as
//! text in the connection's time zone. Outputs are decoded from each value's
//! storage class, refined by the column's declared type.

use super::{collect_tables, is_insert_query, DatabaseDriver, QuerySettings, Row, StatementState};
use crate::error::{Error, Result};
use crate::time::{self, TimeZone};
use crate::value::Value;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Executor, Row as _, Statement as _, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

type NativeConnection = sqlx::sqlite::SqliteConnection;
type PreparedStatement<'q> = sqlx::sqlite::SqliteStatement<'q>;
type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A SQLite database
#[derive(Clone)]
pub struct SqliteConnection {
    pool: SqlitePool,
    time_zone: TimeZone,
    settings: QuerySettings,
}

impl SqliteConnection {
    /// Open a database from a URL such as `sqlite::memory:` or `sqlite:hats.db`
    ///
    /// File databases are created when missing. In-memory databases keep a
    /// single connection alive for the life of the pool so their contents
    /// survive between queries.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` when the URL is invalid or the database
    /// cannot be opened.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = SqliteConnection::connect("sqlite::memory:", 1, QuerySettings::default()).await?;
    /// ```
    pub async fn connect(url: &str, max_connections: u32, settings: QuerySettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool_options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::Database {
                message: format!("SQLite connection failed: {e}"),
            })?;

        info!(url, "Connected to SQLite");
        Ok(Self {
            pool,
            time_zone: time::system_time_zone(),
            settings,
        })
    }

    /// Use a different time zone for values
    #[must_use]
    pub const fn with_time_zone(mut self, time_zone: TimeZone) -> Self {
        self.time_zone = time_zone;
        self
    }

    async fn run(&self, query: &str, parameters: &[Value]) -> Vec<Row> {
        let mut connection = match self.pool.acquire().await {
            Ok(connection) => connection,
            Err(e) => return vec![Row::error(e.to_string())],
        };

        let mut statement = SqliteStatement::prepare(&mut connection, query, self.time_zone).await;
        let rows = statement.execute(parameters).await;
        statement.close();
        rows
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[async_trait]
impl DatabaseDriver for SqliteConnection {
    fn time_zone(&self) -> TimeZone {
        self.time_zone
    }

    async fn execute_query(&self, query: &str, parameters: &[Value]) -> Vec<Row> {
        self.settings
            .run(
                self.driver_name(),
                query,
                parameters.len(),
                self.run(query, parameters),
            )
            .await
    }

    async fn tables(&self) -> HashMap<String, String> {
        let rows = self
            .execute_query(
                "SELECT DISTINCT tbl_name, sql FROM sqlite_master WHERE type='table'",
                &[],
            )
            .await;
        collect_tables(rows, "tbl_name", "sql")
    }

    fn driver_name(&self) -> &'static str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A statement prepared on one pooled connection
pub struct SqliteStatement<'c, 'q> {
    connection: &'c mut NativeConnection,
    query: &'q str,
    prepared: Option<PreparedStatement<'q>>,
    time_zone: TimeZone,
    state: StatementState,
    error: Option<String>,
}

impl<'c, 'q> SqliteStatement<'c, 'q> {
    /// Compile a query
    ///
    /// A query that fails to compile leaves the statement in
    /// `StatementState::Error`, and executing it returns the failure as a row.
    pub async fn prepare(
        connection: &'c mut NativeConnection,
        query: &'q str,
        time_zone: TimeZone,
    ) -> Self {
        let (prepared, state, error) = match (&mut *connection).prepare(query).await {
            Ok(prepared) => (Some(prepared), StatementState::Ready, None),
            Err(e) => (None, StatementState::Error, Some(e.to_string())),
        };

        Self {
            connection,
            query,
            prepared,
            time_zone,
            state,
            error,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> StatementState {
        self.state
    }

    /// Names of the columns the statement produces
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.prepared
            .as_ref()
            .map(|prepared| {
                prepared
                    .columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bind parameters positionally, execute, and collect the rows
    pub async fn execute(&mut self, parameters: &[Value]) -> Vec<Row> {
        if !self.state.can_execute() {
            let message = self
                .error
                .clone()
                .unwrap_or_else(|| format!("Statement cannot execute in state {:?}", self.state));
            return vec![Row::error(message)];
        }
        let Some(prepared) = self.prepared.as_ref() else {
            return vec![Row::error("Statement was not prepared")];
        };

        let binds: Vec<SqliteBindParameter> = parameters
            .iter()
            .map(|value| SqliteBindParameter::from_value(value, self.time_zone))
            .collect();
        let mut query = prepared.query();
        for bind in &binds {
            query = bind.bind(query);
        }

        let outcome = if is_insert_query(self.query) {
            query
                .execute(&mut *self.connection)
                .await
                .map(|done| vec![Row::inserted_id(done.last_insert_rowid())])
        } else {
            query.fetch_all(&mut *self.connection).await.map(|fetched| {
                fetched
                    .iter()
                    .map(|row| decode_row(row, self.time_zone))
                    .collect()
            })
        };

        match outcome {
            Ok(rows) => {
                self.state = StatementState::HasResults;
                debug!(rows = rows.len(), "SQLite statement finished");
                self.state = StatementState::Done;
                rows
            }
            Err(e) => {
                self.state = StatementState::HasError;
                let message = e.to_string();
                self.error = Some(message.clone());
                vec![Row::error(message)]
            }
        }
    }

    /// Release the prepared statement
    ///
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        self.prepared = None;
        self.state = StatementState::Closed;
    }
}

/// One input value in SQLite's native representation
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteBindParameter {
    /// NULL
    Null,
    /// INTEGER storage class
    Integer(i64),
    /// REAL storage class
    Real(f64),
    /// TEXT storage class
    Text(String),
    /// BLOB storage class
    Blob(Vec<u8>),
}

impl SqliteBindParameter {
    /// Convert a value, formatting temporal values in `time_zone`
    #[must_use]
    pub fn from_value(value: &Value, time_zone: TimeZone) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(integer) => Self::Integer(*integer),
            Value::Double(double) => Self::Real(*double),
            Value::Boolean(flag) => Self::Integer(i64::from(*flag)),
            Value::String(text) => Self::Text(text.clone()),
            Value::Binary(bytes) => Self::Blob(bytes.clone()),
            Value::Timestamp(timestamp) => {
                Self::Text(time::format_timestamp(timestamp, time_zone))
            }
            Value::Date(date) => Self::Text(time::format_date(date)),
            Value::Time(time_of_day) => Self::Text(time::format_time(time_of_day)),
        }
    }

    /// Byte length of the bound content
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) => 8,
            Self::Text(text) => text.len(),
            Self::Blob(bytes) => bytes.len(),
        }
    }

    /// Whether the bound content is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bind<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        match self {
            Self::Null => query.bind(None::<i64>),
            Self::Integer(integer) => query.bind(*integer),
            Self::Real(real) => query.bind(*real),
            Self::Text(text) => query.bind(text.clone()),
            Self::Blob(bytes) => query.bind(bytes.clone()),
        }
    }
}

fn decode_row(row: &SqliteRow, time_zone: TimeZone) -> Row {
    let data = row
        .columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name(), time_zone);
            (column.name().to_string(), value)
        })
        .collect();
    Row::new(data)
}

/// Decode one column from its storage class and declared type
///
/// Anything that cannot be decoded becomes `Value::Null`, including text
/// that is not valid UTF-8.
fn decode_column(row: &SqliteRow, index: usize, declared: &str, time_zone: TimeZone) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    match raw.type_info().name() {
        "INTEGER" => match row.try_get_unchecked::<i64, _>(index) {
            Ok(integer) if declared == "BOOLEAN" => Value::Boolean(integer != 0),
            Ok(integer) => Value::Integer(integer),
            Err(_) => Value::Null,
        },
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Double)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Binary)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(|text| decode_text(text, declared, time_zone))
            .unwrap_or(Value::Null),
    }
}

fn decode_text(text: String, declared: &str, time_zone: TimeZone) -> Value {
    let parsed = match declared {
        "DATETIME" => time::parse_timestamp(&text, time_zone).map(Value::Timestamp),
        "DATE" => time::parse_date(&text).map(Value::Date),
        "TIME" => time::parse_time(&text).map(Value::Time),
        _ => None,
    };
    parsed.unwrap_or(Value::String(text))
}
