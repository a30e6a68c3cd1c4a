//! Error taxonomy shared by the connection builder, the SQL toolkit,
//! and the agent loop.

use thiserror::Error;

/// Errors surfaced by pgask components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Missing or malformed user input. Terminal for the session.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The database is unreachable or rejected the credentials. Terminal.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// SQL syntax or execution failure. Observed by the agent, which may
    /// rewrite the query and try again.
    #[error("query failed: {0}")]
    Query(String),

    /// The reasoning capability failed, the step structure was malformed,
    /// or the run exhausted its budget.
    #[error("agent error: {0}")]
    Agent(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("password is required".to_string());
        assert_eq!(err.to_string(), "invalid input: password is required");
    }
}
