//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Connection flags fall back to the standard
//! libpq environment variables.

use crate::llm::Provider;
use crate::models::Secret;
use clap::Parser;
use std::path::PathBuf;

/// pgask - ask a PostgreSQL database questions in plain language
///
/// An LLM agent lists the tables, reads their schemas, writes a read-only
/// query, runs it, and answers from the results.
///
/// Examples:
///   pgask -U admin -d supplychain "Which vendor has fulfilled the most orders?"
///   PGPASSWORD=... CO_API_KEY=... pgask -U admin -d supplychain
///   pgask --provider ollama -m llama3.1:latest -U admin -d supplychain
///   pgask --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Question to ask. Omit for an interactive session.
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    // === Connection ===
    /// Database server host
    #[arg(long, env = "PGHOST", value_name = "HOST")]
    pub host: Option<String>,

    /// Database server port
    #[arg(long, env = "PGPORT", value_name = "PORT")]
    pub port: Option<String>,

    /// Database user name
    #[arg(short = 'U', long, env = "PGUSER", value_name = "USER")]
    pub username: Option<String>,

    /// Database name
    #[arg(short = 'd', long, env = "PGDATABASE", value_name = "NAME")]
    pub database: Option<String>,

    /// Database password (prompted for when omitted)
    #[arg(long, env = "PGPASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub password: Option<Secret>,

    /// Only expose these tables to the agent (comma-separated)
    #[arg(long, value_name = "TABLES", value_delimiter = ',')]
    pub tables: Option<Vec<String>>,

    // === Model ===
    /// Chat model provider
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Model name
    ///
    /// Defaults to command-r-plus for Cohere and llama3.1:latest for Ollama.
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Provider API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Cohere API key (prompted for when omitted)
    #[arg(long, env = "CO_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: Option<Secret>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    // === Agent ===
    /// Default number of rows the agent asks for
    #[arg(long, value_name = "ROWS")]
    pub row_limit: Option<usize>,

    /// Maximum model calls per question
    #[arg(long, value_name = "COUNT")]
    pub max_iterations: Option<usize>,

    /// Time budget per question in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    // === Output ===
    /// Print the available tools and exit
    #[arg(long)]
    pub list_tools: bool,

    /// Print only the final answer, not the intermediate steps
    #[arg(long)]
    pub answer_only: bool,

    /// Write a transcript of the session to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Transcript format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .pgask.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .pgask.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        if self.max_iterations == Some(0) {
            return Err("Max iterations must be at least 1".to_string());
        }

        if self.row_limit == Some(0) {
            return Err("Row limit must be at least 1".to_string());
        }

        if let Some(ref question) = self.question {
            if question.trim().is_empty() {
                return Err("Question must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            question: None,
            host: None,
            port: None,
            username: Some("admin".to_string()),
            database: Some("mydb".to_string()),
            password: Some(Secret::new("p@ss:w/rd")),
            tables: None,
            provider: None,
            model: None,
            api_url: None,
            api_key: None,
            temperature: None,
            timeout: None,
            row_limit: None,
            max_iterations: None,
            deadline: None,
            list_tools: false,
            answer_only: false,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_ok() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.api_url = Some("api.cohere.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_budgets() {
        let mut args = make_args();
        args.max_iterations = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.deadline = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_blank_question() {
        let mut args = make_args();
        args.question = Some("   ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mut args = make_args();
        args.api_key = Some(Secret::new("co-secret-key"));
        let debug = format!("{:?}", args);
        assert!(!debug.contains("p@ss"));
        assert!(!debug.contains("co-secret-key"));
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "pgask",
            "--host",
            "db.internal",
            "-U",
            "report_reader",
            "-d",
            "supplychain",
            "--provider",
            "ollama",
            "--tables",
            "orders,vendors",
            "Which vendor has fulfilled the most orders?",
        ])
        .unwrap();
        assert_eq!(args.host.as_deref(), Some("db.internal"));
        assert_eq!(args.username.as_deref(), Some("report_reader"));
        assert_eq!(args.provider, Some(Provider::Ollama));
        assert_eq!(
            args.tables,
            Some(vec!["orders".to_string(), "vendors".to_string()])
        );
        assert_eq!(
            args.question.as_deref(),
            Some("Which vendor has fulfilled the most orders?")
        );
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
