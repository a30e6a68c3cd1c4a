//! Tool definitions for the SQL agent.
//!
//! This module defines the tools the LLM can use to explore and query the
//! database, and the registry that dispatches its tool calls.

use crate::db::SqlDatabase;
use crate::error::{Error, Result};
use crate::llm::{FunctionDefinition, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const LIST_TABLES: &str = "sql_db_list_tables";
pub const SCHEMA: &str = "sql_db_schema";
pub const QUERY: &str = "sql_db_query";
pub const QUERY_CHECKER: &str = "sql_db_query_checker";

/// A capability the agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;
    async fn invoke(&self, args: &Value) -> Result<String>;
}

/// Result of executing a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }

    /// Text handed back to the model as the tool message.
    pub fn observation(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or_default())
        }
    }
}

/// Read a string argument. A bare string is accepted in place of the
/// arguments object, since some models send the single value directly.
fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    let value = match args {
        Value::String(s) => Some(s.as_str()),
        other => other.get(key).and_then(Value::as_str),
    };
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("Missing required parameter: {}", key)))
}

fn query_parameters(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        },
        "required": ["query"]
    })
}

/// Lists the tables the agent may query.
pub struct ListTablesTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        LIST_TABLES
    }

    fn description(&self) -> &str {
        "Takes no input. Returns a comma-separated list of the tables in the database."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, _args: &Value) -> Result<String> {
        let tables = self.db.list_tables().await?;
        if tables.is_empty() {
            return Ok("The database has no visible tables.".to_string());
        }
        Ok(tables.join(", "))
    }
}

/// Describes tables: columns, types and a few sample rows.
pub struct SchemaTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &str {
        SCHEMA
    }

    fn description(&self) -> &str {
        "Input is a comma-separated list of tables, output is the schema and sample rows \
         for those tables. Make sure the tables exist by calling sql_db_list_tables first! \
         Example input: table1, table2, table3"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table_names": {
                    "type": "string",
                    "description": "Comma-separated list of table names"
                }
            },
            "required": ["table_names"]
        })
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let tables: Vec<String> = string_arg(args, "table_names")?
            .split(',')
            .map(|t| t.trim().trim_matches('"').to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            return Err(Error::Validation(
                "Missing required parameter: table_names".to_string(),
            ));
        }
        self.db.table_info(&tables).await
    }
}

/// Runs a read-only query and returns the rows as JSON.
pub struct QueryTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        QUERY
    }

    fn description(&self) -> &str {
        "Input is a detailed and correct SQL query, output is the result from the database. \
         If the query is not correct, an error message is returned; rewrite the query, check \
         it and try again. If you see an unknown column error, use sql_db_schema to look up \
         the correct column names."
    }

    fn parameters(&self) -> Value {
        query_parameters("A single read-only SQL query")
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let sql = string_arg(args, "query")?;
        let output = self.db.run_query(sql).await?;
        Ok(output.to_observation())
    }
}

/// Checks a query against the server without running it.
pub struct QueryCheckerTool {
    db: Arc<dyn SqlDatabase>,
}

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &str {
        QUERY_CHECKER
    }

    fn description(&self) -> &str {
        "Use this tool to double check that a query is correct before executing it. \
         Always use this tool before executing a query with sql_db_query!"
    }

    fn parameters(&self) -> Value {
        query_parameters("The SQL query to check")
    }

    async fn invoke(&self, args: &Value) -> Result<String> {
        let sql = string_arg(args, "query")?;
        let statement = self.db.check_query(sql).await?;
        Ok(format!("The query is valid: {}", statement))
    }
}

/// Named tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four SQL tools over one shared database.
    pub fn sql_toolkit(db: Arc<dyn SqlDatabase>) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ListTablesTool { db: db.clone() }),
            Arc::new(SchemaTool { db: db.clone() }),
            Arc::new(QueryTool { db: db.clone() }),
            Arc::new(QueryCheckerTool { db }),
        ];

        let mut registry = Self::new();
        for tool in tools {
            if let Err(e) = registry.register(tool) {
                warn!("Skipping tool: {}", e);
            }
        }
        registry
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(Error::Validation(format!(
                "a tool named {} is already registered",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions for the chat API.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                },
            })
            .collect()
    }

    /// Execute a tool call and return the result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!("Executing tool: {} with args: {}", call.name, call.arguments);

        let Some(tool) = self.get(&call.name) else {
            return ToolResult::error(format!("Unknown tool: {}", call.name));
        };

        match tool.invoke(&call.arguments).await {
            Ok(output) => ToolResult::success(output),
            Err(Error::Query(message)) | Err(Error::Validation(message)) => {
                ToolResult::error(message)
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::FakeDatabase;
    use crate::db::QueryOutput;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn toolkit() -> (Arc<FakeDatabase>, ToolRegistry) {
        let db = Arc::new(FakeDatabase::with_tables(&[
            ("orders", &["id", "vendor_id", "total"]),
            ("vendors", &["id", "name"]),
        ]));
        let registry = ToolRegistry::sql_toolkit(db.clone());
        (db, registry)
    }

    #[test]
    fn test_tool_definitions() {
        let (_, registry) = toolkit();
        let tools = registry.definitions();
        assert_eq!(tools.len(), 4);

        let names: Vec<_> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, vec![LIST_TABLES, SCHEMA, QUERY, QUERY_CHECKER]);
        assert!(tools.iter().all(|t| t.tool_type == "function"));
        assert_eq!(tools[1].function.parameters["required"][0], "table_names");
    }

    #[test]
    fn test_toolkit_built_through_register() {
        let empty = ToolRegistry::new();
        assert!(empty.is_empty());
        assert!(empty.definitions().is_empty());

        let (_, registry) = toolkit();
        assert!(!registry.is_empty());
        assert!(registry.get(QUERY_CHECKER).is_some());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (db, mut registry) = toolkit();
        let err = registry.register(Arc::new(QueryTool { db })).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_, registry) = toolkit();
        let result = registry.execute(&call(LIST_TABLES, json!({}))).await;
        assert!(result.success);
        assert_eq!(result.output, "orders, vendors");
    }

    #[tokio::test]
    async fn test_schema_splits_table_names() {
        let (db, registry) = toolkit();
        let result = registry
            .execute(&call(SCHEMA, json!({"table_names": "orders, \"vendors\""})))
            .await;
        assert!(result.success);
        assert!(result.output.contains("CREATE TABLE \"orders\""));
        assert!(result.output.contains("CREATE TABLE \"vendors\""));
        assert_eq!(db.calls(), vec!["table_info:orders,vendors"]);
    }

    #[tokio::test]
    async fn test_schema_unknown_table_is_error_result() {
        let (_, registry) = toolkit();
        let result = registry
            .execute(&call(SCHEMA, json!({"table_names": "invoices"})))
            .await;
        assert!(!result.success);
        assert!(result.observation().starts_with("Error: "));
        assert!(result.observation().contains("invoices"));
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let db = Arc::new(FakeDatabase {
            query_result: Some(QueryOutput {
                columns: vec!["name".to_string()],
                rows: vec![json!({"name": "Acme"}).as_object().cloned().unwrap()],
                truncated: false,
            }),
            ..FakeDatabase::with_tables(&[("vendors", &["id", "name"])])
        });
        let registry = ToolRegistry::sql_toolkit(db);
        let result = registry
            .execute(&call(QUERY, json!({"query": "SELECT \"name\" FROM \"vendors\""})))
            .await;
        assert!(result.success);
        assert_eq!(result.output, r#"[{"name":"Acme"}]"#);
    }

    #[tokio::test]
    async fn test_destructive_query_never_reaches_database() {
        let (db, registry) = toolkit();
        for sql in ["DROP TABLE orders", "DELETE FROM orders", "SELECT 1; DROP TABLE orders"] {
            let result = registry.execute(&call(QUERY, json!({ "query": sql }))).await;
            assert!(!result.success, "{} should fail", sql);
        }
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_checker() {
        let (db, registry) = toolkit();
        let result = registry
            .execute(&call(QUERY_CHECKER, json!({"query": "SELECT 1;"})))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "The query is valid: SELECT 1");
        assert_eq!(db.calls(), vec!["check_query:SELECT 1"]);
    }

    #[tokio::test]
    async fn test_bare_string_argument_accepted() {
        let (_, registry) = toolkit();
        let result = registry.execute(&call(QUERY, json!("SELECT 1"))).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_missing_argument_and_unknown_tool() {
        let (_, registry) = toolkit();
        let result = registry.execute(&call(QUERY, json!({}))).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Missing required parameter: query")
        );

        let result = registry.execute(&call("drop_everything", json!({}))).await;
        assert_eq!(result.error.as_deref(), Some("Unknown tool: drop_everything"));
    }
}
