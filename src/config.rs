//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.pgask.toml` files. Credentials (the database password and the API
//! key) are never read from or written to the file.

use crate::agent::AgentConfig;
use crate::db::PgOptions;
use crate::error::Error;
use crate::llm::{ModelSettings, Provider};
use crate::models::Secret;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".pgask.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Agent settings.
    #[serde(default)]
    pub agent: AgentSection,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat provider.
    #[serde(default)]
    pub provider: Provider,

    /// Model name. Defaults depend on the provider.
    #[serde(default)]
    pub name: Option<String>,

    /// API base URL. Defaults depend on the provider.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: None,
            api_url: None,
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout() -> u64 {
    120
}

impl ModelConfig {
    pub fn model_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| self.provider.default_url().to_string())
    }
}

/// Database connection settings (everything except the password).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    /// When non-empty, only these tables are visible to the agent.
    #[serde(default)]
    pub include_tables: Vec<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Server-side limit for each query the agent runs.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            database: None,
            include_tables: Vec::new(),
            connect_timeout_seconds: default_connect_timeout(),
            statement_timeout_seconds: default_statement_timeout(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_statement_timeout() -> u64 {
    30
}

/// Agent loop and toolkit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Default number of rows the prompt asks the agent to return.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,

    /// Maximum model calls per question.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Time budget per question in seconds.
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,

    /// Maximum rows a query observation may contain.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// String cells longer than this are cut.
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,

    /// Sample rows shown with each table schema.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Require listing tables and reading schemas before querying.
    #[serde(default = "default_true")]
    pub enforce_policy: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
            max_iterations: default_max_iterations(),
            deadline_seconds: default_deadline(),
            max_result_rows: default_max_result_rows(),
            max_string_length: default_max_string_length(),
            sample_rows: default_sample_rows(),
            enforce_policy: true,
        }
    }
}

fn default_row_limit() -> usize {
    5
}

fn default_max_iterations() -> usize {
    25
}

fn default_deadline() -> u64 {
    300
}

fn default_max_result_rows() -> usize {
    100
}

fn default_max_string_length() -> usize {
    300
}

fn default_sample_rows() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and the environment variables behind them) take
    /// precedence over config file settings. The port is left to the
    /// connection builder, which validates it.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Switching provider drops the other provider's model and URL
        if let Some(provider) = args.provider {
            if provider != self.model.provider {
                self.model.api_url = None;
                self.model.name = None;
            }
            self.model.provider = provider;
        }
        if let Some(ref name) = args.model {
            self.model.name = Some(name.clone());
        }
        if let Some(ref url) = args.api_url {
            self.model.api_url = Some(url.clone());
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref host) = args.host {
            self.database.host = host.clone();
        }
        if let Some(ref username) = args.username {
            self.database.username = Some(username.clone());
        }
        if let Some(ref database) = args.database {
            self.database.database = Some(database.clone());
        }
        if let Some(ref tables) = args.tables {
            self.database.include_tables = tables.clone();
        }

        if let Some(row_limit) = args.row_limit {
            self.agent.row_limit = row_limit;
        }
        if let Some(max_iterations) = args.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
        if let Some(deadline) = args.deadline {
            self.agent.deadline_seconds = deadline;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check the merged settings. File values get the same bounds as the
    /// matching command-line flags; a zero timeout or limit is rejected
    /// rather than silently disabling the bound.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |message: &str| Err(Error::Validation(message.to_string()));

        if let Some(ref url) = self.model.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return invalid("model.api_url must start with 'http://' or 'https://'");
            }
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return invalid("model.temperature must be between 0.0 and 1.0");
        }
        if self.model.timeout_seconds == 0 {
            return invalid("model.timeout_seconds must be at least 1");
        }

        if self.database.port == 0 {
            return invalid("database.port must not be 0");
        }
        if self.database.connect_timeout_seconds == 0 {
            return invalid("database.connect_timeout_seconds must be at least 1");
        }
        if self.database.statement_timeout_seconds == 0 {
            return invalid("database.statement_timeout_seconds must be at least 1");
        }

        if self.agent.row_limit == 0 {
            return invalid("agent.row_limit must be at least 1");
        }
        if self.agent.max_iterations == 0 {
            return invalid("agent.max_iterations must be at least 1");
        }
        if self.agent.deadline_seconds == 0 {
            return invalid("agent.deadline_seconds must be at least 1");
        }
        if self.agent.max_result_rows == 0 {
            return invalid("agent.max_result_rows must be at least 1");
        }
        if self.agent.max_string_length == 0 {
            return invalid("agent.max_string_length must be at least 1");
        }

        Ok(())
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            row_limit: self.agent.row_limit,
            max_iterations: self.agent.max_iterations,
            deadline: Duration::from_secs(self.agent.deadline_seconds),
            enforce_policy: self.agent.enforce_policy,
        }
    }

    pub fn pg_options(&self) -> PgOptions {
        PgOptions {
            connect_timeout: Duration::from_secs(self.database.connect_timeout_seconds),
            statement_timeout: Duration::from_secs(self.database.statement_timeout_seconds),
            include_tables: self.database.include_tables.clone(),
            sample_rows: self.agent.sample_rows,
            max_result_rows: self.agent.max_result_rows,
            max_string_length: self.agent.max_string_length,
        }
    }

    pub fn model_settings(&self, api_key: Option<Secret>) -> ModelSettings {
        ModelSettings {
            provider: self.model.provider,
            model: self.model.model_name(),
            api_url: self.model.api_url(),
            api_key,
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
