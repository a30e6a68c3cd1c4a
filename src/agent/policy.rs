//! Ordering rules for tool use within one agent run.
//!
//! The prompt asks the model to list tables first and read schemas before
//! querying; this enforces the same order so a model that skips ahead gets
//! a corrective observation instead of a result.

use crate::agent::tools::{LIST_TABLES, QUERY, SCHEMA};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    enabled: bool,
    listed_tables: bool,
    inspected_schema: bool,
}

impl ToolPolicy {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    /// Decide whether `tool` may run now. Returns the rejection message
    /// otherwise.
    pub fn check(&self, tool: &str) -> Result<(), String> {
        if !self.enabled || tool == LIST_TABLES {
            return Ok(());
        }
        if !self.listed_tables {
            debug!("Rejecting {} before tables were listed", tool);
            return Err(format!(
                "{} was not run: call {} first to see which tables exist.",
                tool, LIST_TABLES
            ));
        }
        if tool == QUERY && !self.inspected_schema {
            debug!("Rejecting {} before any schema was inspected", tool);
            return Err(format!(
                "{} was not run: call {} on the relevant tables before querying.",
                tool, SCHEMA
            ));
        }
        Ok(())
    }

    /// Record a successful tool run.
    pub fn record(&mut self, tool: &str) {
        match tool {
            LIST_TABLES => self.listed_tables = true,
            SCHEMA => self.inspected_schema = true,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::QUERY_CHECKER;

    #[test]
    fn test_list_tables_always_allowed() {
        assert!(ToolPolicy::new(true).check(LIST_TABLES).is_ok());
    }

    #[test]
    fn test_query_before_listing_rejected() {
        let policy = ToolPolicy::new(true);
        let err = policy.check(QUERY).unwrap_err();
        assert!(err.contains(LIST_TABLES));
        assert!(policy.check(SCHEMA).is_err());
        assert!(policy.check(QUERY_CHECKER).is_err());
    }

    #[test]
    fn test_query_before_schema_rejected() {
        let mut policy = ToolPolicy::new(true);
        policy.record(LIST_TABLES);
        assert!(policy.check(SCHEMA).is_ok());
        assert!(policy.check(QUERY_CHECKER).is_ok());
        assert!(policy.check(QUERY).unwrap_err().contains(SCHEMA));

        policy.record(SCHEMA);
        assert!(policy.check(QUERY).is_ok());
    }

    #[test]
    fn test_disabled_policy_allows_everything() {
        let policy = ToolPolicy::new(false);
        assert!(policy.check(QUERY).is_ok());
        assert!(policy.check("anything").is_ok());
    }
}
