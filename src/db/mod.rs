//! Database access for the SQL toolkit.
//!
//! This module provides the connection URI builder, the read-only
//! statement guard, and the [`SqlDatabase`] abstraction the agent's tools
//! run against.

pub mod connection;
pub mod guard;
pub mod postgres;

pub use connection::{ConnectionDescriptor, ConnectionFields};
pub use postgres::{PgDatabase, PgOptions};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Rows returned by a read-only query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Column names, in select-list order.
    pub columns: Vec<String>,
    /// One JSON object per row.
    pub rows: Vec<Map<String, Value>>,
    /// True when more rows existed than were returned.
    pub truncated: bool,
}

impl QueryOutput {
    /// Render the rows the way the query tool reports them to the agent.
    pub fn to_observation(&self) -> String {
        if self.rows.is_empty() {
            return "The query returned no rows.".to_string();
        }

        let body = serde_json::to_string(&self.rows).unwrap_or_else(|_| "[]".to_string());
        if self.truncated {
            format!(
                "{}\n(showing the first {} rows; add a LIMIT or narrow the query)",
                body,
                self.rows.len()
            )
        } else {
            body
        }
    }
}

/// Safe operations the agent may perform against a SQL database.
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    /// Human-readable SQL dialect name, e.g. `PostgreSQL`.
    fn dialect(&self) -> &str;

    /// Names of the tables the agent may query.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Schema description and sample rows for the given tables.
    async fn table_info(&self, tables: &[String]) -> Result<String>;

    /// Run a read-only query.
    async fn run_query(&self, sql: &str) -> Result<QueryOutput>;

    /// Check a query for errors without executing it. Returns the
    /// statement as it would be run.
    async fn check_query(&self, sql: &str) -> Result<String>;
}

/// Cut string values longer than `max_len` characters, appending `...`.
pub fn truncate_strings(row: &mut Map<String, Value>, max_len: usize) {
    for value in row.values_mut() {
        if let Value::String(s) = value {
            if s.chars().count() > max_len {
                let cut: String = s.chars().take(max_len).collect();
                *s = format!("{}...", cut);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_strings() {
        let mut row = json!({"name": "abcdefghij", "id": 7, "short": "abc"})
            .as_object()
            .cloned()
            .unwrap();
        truncate_strings(&mut row, 5);
        assert_eq!(row["name"], "abcde...");
        assert_eq!(row["short"], "abc");
        assert_eq!(row["id"], 7);
    }

    #[test]
    fn test_observation_empty() {
        assert_eq!(
            QueryOutput::default().to_observation(),
            "The query returned no rows."
        );
    }

    #[test]
    fn test_observation_truncated() {
        let output = QueryOutput {
            columns: vec!["vendor".to_string()],
            rows: vec![json!({"vendor": "Acme"}).as_object().cloned().unwrap()],
            truncated: true,
        };
        let text = output.to_observation();
        assert!(text.starts_with(r#"[{"vendor":"Acme"}]"#));
        assert!(text.contains("showing the first 1 rows"));
    }

    #[test]
    fn test_fake_database_guards_writes() {
        let db = testing::FakeDatabase::with_tables(&[("orders", &["id integer"])]);
        tokio_test::block_on(async {
            assert_eq!(db.list_tables().await.unwrap(), vec!["orders"]);
            let err = db.run_query("DELETE FROM orders").await.unwrap_err();
            assert!(matches!(err, crate::error::Error::Query(_)));
            assert_eq!(
                db.check_query("SELECT id FROM orders;").await.unwrap(),
                "SELECT id FROM orders"
            );
        });
        assert_eq!(
            db.calls(),
            vec!["list_tables", "check_query:SELECT id FROM orders"]
        );
    }
}
