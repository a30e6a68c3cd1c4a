//! Read-only statement filter.
//!
//! Runs before any SQL reaches the database. The statement is parsed with
//! the PostgreSQL dialect and accepted only if it is a single query whose
//! tree holds no nested write statement, no `SELECT ... INTO` and no call
//! to a server function with side effects.

use crate::error::{Error, Result};
use sqlparser::ast::{Expr, ObjectName, Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

/// Server functions with side effects outside the transaction.
const ADMIN_FUNCTIONS: &[&str] = &[
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_sleep",
    "lo_import",
    "lo_export",
    "dblink_exec",
];

/// Check that `sql` is a single read-only statement.
///
/// Returns the statement with trailing semicolons and whitespace removed.
/// Comments are left in place.
pub fn ensure_read_only(sql: &str) -> Result<&str> {
    let statement = trim_statement(sql);
    if statement.is_empty() {
        return Err(Error::Query("empty SQL statement".to_string()));
    }

    let parsed = Parser::parse_sql(&PostgreSqlDialect {}, statement)
        .map_err(|e| Error::Query(format!("could not parse SQL: {}", e)))?;

    let query = match parsed.as_slice() {
        [] => return Err(Error::Query("empty SQL statement".to_string())),
        [query] => query,
        _ => {
            return Err(Error::Query(
                "only a single SQL statement may be executed at a time".to_string(),
            ))
        }
    };

    if let ControlFlow::Break(reason) = query.visit(&mut ReadOnlyCheck) {
        return Err(Error::Query(reason));
    }

    Ok(statement)
}

/// Strip trailing semicolons and surrounding whitespace.
fn trim_statement(sql: &str) -> &str {
    let mut s = sql.trim();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    s
}

/// Walks a parsed statement and stops at the first thing that could write.
struct ReadOnlyCheck;

impl Visitor for ReadOnlyCheck {
    type Break = String;

    // Also reached for statements nested in CTEs (`WITH x AS (DELETE ...)`)
    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<String> {
        match statement {
            Statement::Query(_) => ControlFlow::Continue(()),
            other => ControlFlow::Break(format!(
                "only read-only queries are allowed (found {})",
                leading_keyword(other)
            )),
        }
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<String> {
        if selects_into(&query.body) {
            return ControlFlow::Break("SELECT ... INTO is not allowed".to_string());
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<String> {
        match expr {
            Expr::Function(function) => deny_admin_function(&function.name),
            _ => ControlFlow::Continue(()),
        }
    }

    // Set-returning functions in FROM
    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<String> {
        deny_admin_function(relation)
    }
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

fn deny_admin_function(name: &ObjectName) -> ControlFlow<String> {
    let name = base_name(name);
    if ADMIN_FUNCTIONS.contains(&name.as_str()) {
        ControlFlow::Break(format!("function {} is not allowed", name))
    } else {
        ControlFlow::Continue(())
    }
}

/// Unqualified, unquoted, lower-cased name: `pg_catalog."PG_SLEEP"` → `pg_sleep`.
fn base_name(name: &ObjectName) -> String {
    let text = name.to_string();
    text.rsplit('.')
        .next()
        .unwrap_or(text.as_str())
        .trim_matches('"')
        .to_lowercase()
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_allowed() {
        assert_eq!(
            ensure_read_only("SELECT \"name\" FROM \"vendors\" LIMIT 5;").unwrap(),
            "SELECT \"name\" FROM \"vendors\" LIMIT 5"
        );
        assert!(ensure_read_only("  select 1  ").is_ok());
        assert!(ensure_read_only("VALUES (1), (2)").is_ok());
        assert!(ensure_read_only("SELECT 1 UNION SELECT 2").is_ok());
    }

    #[test]
    fn test_cte_select_allowed() {
        let sql = "WITH totals AS (SELECT vendor_id, count(*) AS n FROM orders GROUP BY vendor_id) \
                   SELECT * FROM totals ORDER BY n DESC LIMIT 5";
        assert!(ensure_read_only(sql).is_ok());
    }

    #[test]
    fn test_trailing_comment_kept() {
        let sql = "SELECT \"name\" FROM \"vendors\" -- top vendor";
        assert_eq!(ensure_read_only(sql).unwrap(), sql);
    }

    #[test]
    fn test_row_locks_left_to_the_server() {
        // The read-only transaction refuses these; the filter does not need to
        assert!(ensure_read_only("SELECT * FROM orders FOR UPDATE").is_ok());
    }

    #[test]
    fn test_dml_rejected() {
        for sql in [
            "INSERT INTO orders VALUES (1)",
            "UPDATE orders SET status = 'x'",
            "DELETE FROM orders",
            "DROP TABLE orders",
            "CREATE TABLE t (id int)",
            "ALTER TABLE orders ADD COLUMN x int",
            "TRUNCATE orders",
            "GRANT ALL ON orders TO public",
        ] {
            assert!(
                matches!(ensure_read_only(sql), Err(Error::Query(_))),
                "{} should be rejected",
                sql
            );
        }
    }

    #[test]
    fn test_data_modifying_cte_rejected() {
        let sql = "WITH gone AS (DELETE FROM orders RETURNING *) SELECT count(*) FROM gone";
        assert!(ensure_read_only(sql).is_err());
        let sql = "WITH added AS (INSERT INTO orders VALUES (1) RETURNING id) SELECT id FROM added";
        assert!(ensure_read_only(sql).is_err());
    }

    #[test]
    fn test_select_into_rejected() {
        let err = ensure_read_only("SELECT * INTO backup FROM orders").unwrap_err();
        assert!(err.to_string().contains("INTO"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = ensure_read_only("SELECT 1; DROP TABLE orders").unwrap_err();
        assert!(err.to_string().contains("single SQL statement"));
        assert!(ensure_read_only("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn test_keywords_in_literals_ignored() {
        assert!(ensure_read_only("SELECT * FROM audit WHERE action = 'DELETE; DROP'").is_ok());
        assert!(ensure_read_only("SELECT 'it''s an update' AS note").is_ok());
        assert!(ensure_read_only("SELECT \"update\", \"into\" FROM \"events\"").is_ok());
        assert!(ensure_read_only("SELECT $$DROP TABLE x;$$ AS body").is_ok());
    }

    #[test]
    fn test_keywords_in_comments_ignored() {
        assert!(ensure_read_only("SELECT 1 -- then DELETE everything").is_ok());
        assert!(ensure_read_only("/* DROP */ SELECT 1").is_ok());
    }

    #[test]
    fn test_column_names_containing_keywords() {
        assert!(ensure_read_only("SELECT created_at, updated_at, deleted FROM orders").is_ok());
    }

    #[test]
    fn test_admin_functions_rejected() {
        assert!(ensure_read_only("SELECT pg_terminate_backend(1234)").is_err());
        assert!(ensure_read_only("SELECT pg_sleep(600)").is_err());
        assert!(ensure_read_only("SELECT pg_catalog.pg_sleep(600)").is_err());
        assert!(ensure_read_only("SELECT id FROM orders WHERE pg_cancel_backend(id)").is_err());
    }

    #[test]
    fn test_empty_and_non_read_statements() {
        assert!(ensure_read_only("").is_err());
        assert!(ensure_read_only(" ; ; ").is_err());
        assert!(ensure_read_only("-- just a comment").is_err());
        assert!(ensure_read_only("EXPLAIN ANALYZE SELECT 1").is_err());
        assert!(ensure_read_only("SET search_path TO evil").is_err());
        assert!(ensure_read_only("SELEC 1").is_err());
    }
}
