//! Instruction prompt given to the agent as its system message.

/// Instruction text with `{dialect}` and `{top_k}` placeholders.
pub const SQL_AGENT_INSTRUCTIONS: &str = r#"You are an agent designed to interact with a SQL database.
Given an input question, create a syntactically correct {dialect} query to run,
then look at the results of the query and return the answer.
Unless the user asks for a specific number of examples, always limit your query
to at most {top_k} results.
You can order the results by a relevant column to return the most interesting
examples in the database. Never query for all the columns of a table, only ask
for the columns relevant to the question.
You MUST double check your query with sql_db_query_checker before executing it.
If you get an error while executing a query, rewrite the query and try again.
DO NOT make any DML or DDL statements (INSERT, UPDATE, DELETE, DROP etc.) to the
database.
When writing queries, ALWAYS wrap table and column names in double quotes. For
example, instead of writing SELECT * FROM table_name, write SELECT * FROM
"table_name". This matters for names that are reserved keywords or contain
special characters.
To start you should ALWAYS look at the tables in the database to see what you
can query. Do NOT skip this step.
Then you should query the schema of the most relevant tables."#;

/// Agent instructions bound to a dialect and row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub instructions: String,
    pub dialect: String,
    pub row_limit: usize,
}

impl PromptTemplate {
    pub fn new(dialect: impl Into<String>, row_limit: usize) -> Self {
        Self {
            instructions: SQL_AGENT_INSTRUCTIONS.to_string(),
            dialect: dialect.into(),
            row_limit,
        }
    }

    /// Substitute the placeholders. Pure: equal inputs give equal output.
    pub fn render(&self) -> String {
        self.instructions
            .replace("{dialect}", &self.dialect)
            .replace("{top_k}", &self.row_limit.to_string())
    }
}
