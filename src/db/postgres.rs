//! PostgreSQL implementation of [`SqlDatabase`] using sqlx.
//!
//! Every statement the agent sends runs inside a read-only transaction
//! with a statement timeout, and the transaction is always rolled back.

use crate::db::{guard, truncate_strings, ConnectionDescriptor, QueryOutput, SqlDatabase};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Column, Executor, Row, TypeInfo};
use std::time::Duration;
use tracing::{debug, info};

const LIST_TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema::text = ANY (current_schemas(false)::text[]) \
     AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, is_nullable::text \
     FROM information_schema.columns \
     WHERE table_name = $1 \
     AND table_schema::text = ANY (current_schemas(false)::text[]) \
     ORDER BY ordinal_position";

const CURSOR_NAME: &str = "pgask_rows";

/// Sample-row cells are cut shorter than query results.
const SAMPLE_CELL_LENGTH: usize = 100;

/// Tuning knobs for the PostgreSQL toolkit.
#[derive(Debug, Clone)]
pub struct PgOptions {
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
    /// When non-empty, only these tables are visible to the agent.
    pub include_tables: Vec<String>,
    /// Example rows appended to each table description.
    pub sample_rows: usize,
    pub max_result_rows: usize,
    pub max_string_length: usize,
}

impl Default for PgOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            include_tables: Vec::new(),
            sample_rows: 3,
            max_result_rows: 100,
            max_string_length: 300,
        }
    }
}

/// A live PostgreSQL database shared by all tools of a session.
pub struct PgDatabase {
    pool: PgPool,
    options: PgOptions,
}

impl PgDatabase {
    /// Open a single-connection pool. Fails with [`Error::Connection`] if
    /// the server is unreachable or rejects the credentials.
    pub async fn connect(descriptor: &ConnectionDescriptor, options: PgOptions) -> Result<Self> {
        info!("Connecting to {}", descriptor);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(options.connect_timeout)
            .connect(&descriptor.uri())
            .await
            .map_err(|e| Error::Connection(descriptor.redact(&e.to_string())))?;

        debug!("Connection pool ready");
        Ok(Self { pool, options })
    }

    fn is_visible(&self, table: &str) -> bool {
        self.options.include_tables.is_empty()
            || self.options.include_tables.iter().any(|t| t == table)
    }

    /// Run `sql` in a rolled-back `READ ONLY` transaction and read at most
    /// `limit` rows, plus one more to report truncation.
    ///
    /// The statement goes through a server-side cursor unchanged, so only
    /// the rows asked for are produced. The query error wins over a failed
    /// rollback.
    async fn fetch_rows(&self, sql: &str, limit: usize) -> Result<FetchedRows> {
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.options.statement_timeout.as_millis()
        );

        let mut tx = self.pool.begin().await.map_err(query_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        let fetched = read_through_cursor(&mut *tx, sql, limit).await;
        // Nothing the agent runs is ever committed
        let rolled_back = tx.rollback().await;
        query_error_first(fetched, rolled_back)
    }

    async fn describe_table(&self, table: &str) -> Result<String> {
        let columns = sqlx::query(COLUMNS_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Query(format!(
                    "failed to fetch schema for table '{}': {}",
                    table, e
                ))
            })?;

        let mut section = format!("\nCREATE TABLE {} (\n", quote_ident(table));
        let definitions: Vec<String> = columns
            .iter()
            .map(|row| {
                let name: String = row.try_get(0).unwrap_or_default();
                let data_type: String = row.try_get(1).unwrap_or_default();
                let nullable: String = row.try_get(2).unwrap_or_default();
                let constraint = if nullable == "NO" { " NOT NULL" } else { "" };
                format!("\t{} {}{}", quote_ident(&name), data_type.to_uppercase(), constraint)
            })
            .collect();
        section.push_str(&definitions.join(",\n"));
        section.push_str("\n)\n");

        if self.options.sample_rows > 0 {
            section.push_str(&self.sample_rows_comment(table).await);
        }

        Ok(section)
    }

    async fn sample_rows_comment(&self, table: &str) -> String {
        let n = self.options.sample_rows;
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), n);

        let mut comment = format!("\n/*\n{} rows from {} table:\n", n, table);
        match self.fetch_rows(&sql, n).await {
            Ok(FetchedRows { columns, mut rows, .. }) => {
                if !columns.is_empty() {
                    comment.push_str(&columns.join("\t"));
                    comment.push('\n');
                }
                for row in &mut rows {
                    truncate_strings(row, SAMPLE_CELL_LENGTH);
                    let cells: Vec<String> = row.values().map(cell_text).collect();
                    comment.push_str(&cells.join("\t"));
                    comment.push('\n');
                }
            }
            Err(e) => {
                comment.push_str(&format!("Error fetching sample rows: {}\n", e));
            }
        }
        comment.push_str("*/\n");
        comment
    }
}

#[async_trait]
impl SqlDatabase for PgDatabase {
    fn dialect(&self) -> &str {
        "PostgreSQL"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(LIST_TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Query(format!("failed to fetch table names: {}", e)))?;

        let tables = rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .filter(|name| self.is_visible(name))
            .collect();

        Ok(tables)
    }

    async fn table_info(&self, tables: &[String]) -> Result<String> {
        let available = self.list_tables().await?;
        let missing: Vec<&str> = tables
            .iter()
            .filter(|t| !available.contains(t))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Query(format!(
                "table_names {{{}}} not found in database",
                missing.join(", ")
            )));
        }

        let mut info = String::new();
        for table in tables {
            info.push_str(&self.describe_table(table).await?);
        }
        Ok(info)
    }

    async fn run_query(&self, sql: &str) -> Result<QueryOutput> {
        let sql = guard::ensure_read_only(sql)?;
        debug!("Running query: {}", sql);

        let FetchedRows {
            columns,
            mut rows,
            truncated,
        } = self.fetch_rows(sql, self.options.max_result_rows).await?;
        for row in &mut rows {
            truncate_strings(row, self.options.max_string_length);
        }

        Ok(QueryOutput {
            columns,
            rows,
            truncated,
        })
    }

    async fn check_query(&self, sql: &str) -> Result<String> {
        let sql = guard::ensure_read_only(sql)?;
        // Parse and plan on the server without executing
        (&self.pool).prepare(sql).await.map_err(query_error)?;
        Ok(sql.to_string())
    }
}

/// Rows read back from one statement, keyed by unique column names.
struct FetchedRows {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
    truncated: bool,
}

/// Declare a cursor over `sql` and fetch `limit + 1` rows from it.
///
/// Both go over the simple query protocol, so every value arrives as text
/// and is converted by column type in [`text_to_json`].
async fn read_through_cursor(
    conn: &mut PgConnection,
    sql: &str,
    limit: usize,
) -> Result<FetchedRows> {
    let declare = declare_cursor_sql(sql);
    (&mut *conn)
        .execute(sqlx::raw_sql(&declare))
        .await
        .map_err(query_error)?;

    let fetch = format!("FETCH FORWARD {} FROM {}", limit + 1, CURSOR_NAME);
    let fetched = (&mut *conn)
        .fetch_all(sqlx::raw_sql(&fetch))
        .await
        .map_err(query_error)?;

    let columns = fetched
        .first()
        .map(|row| unique_column_names(row.columns().iter().map(|c| c.name())))
        .unwrap_or_default();

    let truncated = fetched.len() > limit;
    let mut rows = Vec::with_capacity(fetched.len().min(limit));
    for row in fetched.iter().take(limit) {
        let mut object = Map::with_capacity(columns.len());
        for (index, (name, column)) in columns.iter().zip(row.columns()).enumerate() {
            let text: Option<String> = row.try_get_unchecked(index).map_err(query_error)?;
            object.insert(name.clone(), text_to_json(column.type_info().name(), text));
        }
        rows.push(object);
    }

    Ok(FetchedRows {
        columns,
        rows,
        truncated,
    })
}

/// The query's own error is what the agent needs to see, even when the
/// rollback after it failed too.
fn query_error_first<T>(
    fetched: Result<T>,
    rolled_back: std::result::Result<(), sqlx::Error>,
) -> Result<T> {
    let fetched = fetched?;
    rolled_back.map_err(query_error)?;
    Ok(fetched)
}

/// The newline ends a trailing `--` comment in the agent's statement.
fn declare_cursor_sql(sql: &str) -> String {
    format!("DECLARE {} NO SCROLL CURSOR FOR {}\n", CURSOR_NAME, sql)
}

/// Column names made unique in order: `id, id` becomes `id, id_2`.
fn unique_column_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 2;
        while unique.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        unique.push(candidate);
    }
    unique
}

/// Convert a text-format value to JSON according to its column type.
fn text_to_json(type_name: &str, text: Option<String>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    match type_name {
        "BOOL" => Value::Bool(text == "t"),
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        "JSON" | "JSONB" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

fn query_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::Database(db) => Error::Query(db.message().to_string()),
        other => Error::Query(other.to_string()),
    }
}

/// Quote an identifier with double quotes, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("Order Items"), "\"Order Items\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("Acme")), "Acme");
        assert_eq!(cell_text(&json!(null)), "None");
        assert_eq!(cell_text(&json!(42)), "42");
        assert_eq!(cell_text(&json!(true)), "true");
    }

    #[test]
    fn test_duplicate_column_names_kept_apart() {
        // SELECT o."id", v."id" FROM orders o JOIN vendors v ...
        assert_eq!(unique_column_names(["id", "id"]), vec!["id", "id_2"]);
        // SELECT 1, 2
        assert_eq!(
            unique_column_names(["?column?", "?column?"]),
            vec!["?column?", "?column?_2"]
        );
        assert_eq!(
            unique_column_names(["id", "id_2", "id"]),
            vec!["id", "id_2", "id_3"]
        );
        assert_eq!(unique_column_names(["vendor", "total"]), vec!["vendor", "total"]);
    }

    #[test]
    fn test_text_to_json_by_type() {
        assert_eq!(text_to_json("INT4", Some("10".to_string())), json!(10));
        assert_eq!(text_to_json("INT8", None), json!(null));
        assert_eq!(text_to_json("NUMERIC", Some("12.50".to_string())), json!(12.5));
        assert_eq!(text_to_json("BOOL", Some("t".to_string())), json!(true));
        assert_eq!(text_to_json("BOOL", Some("f".to_string())), json!(false));
        assert_eq!(
            text_to_json("JSONB", Some(r#"{"a": 1}"#.to_string())),
            json!({"a": 1})
        );
        assert_eq!(text_to_json("TEXT", Some("Acme".to_string())), json!("Acme"));
        assert_eq!(
            text_to_json("TIMESTAMPTZ", Some("2024-05-01 10:00:00+00".to_string())),
            json!("2024-05-01 10:00:00+00")
        );
        assert_eq!(text_to_json("NUMERIC", Some("NaN".to_string())), json!("NaN"));
    }

    #[test]
    fn test_cursor_survives_trailing_comment() {
        let sql =
            guard::ensure_read_only("SELECT \"name\" FROM \"vendors\" -- top vendor;").unwrap();
        let declare = declare_cursor_sql(sql);
        assert_eq!(
            declare,
            "DECLARE pgask_rows NO SCROLL CURSOR FOR SELECT \"name\" FROM \"vendors\" -- top vendor\n"
        );
        // The statement is passed through, not wrapped in a subquery
        assert!(!declare.contains(") AS"));
    }

    #[test]
    fn test_query_error_reported_before_rollback_error() {
        let failed: Result<()> = Err(Error::Query("column \"nme\" does not exist".to_string()));
        let err = query_error_first(failed, Err(sqlx::Error::PoolClosed)).unwrap_err();
        assert_eq!(err, Error::Query("column \"nme\" does not exist".to_string()));

        let err = query_error_first(Ok(3), Err(sqlx::Error::PoolClosed)).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        assert_eq!(query_error_first(Ok(3), Ok(())).unwrap(), 3);
    }

    #[test]
    fn test_default_options() {
        let options = PgOptions::default();
        assert_eq!(options.sample_rows, 3);
        assert_eq!(options.max_result_rows, 100);
        assert!(options.include_tables.is_empty());
        assert!(SAMPLE_CELL_LENGTH < options.max_string_length);
    }
}
