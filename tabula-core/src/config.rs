// Configuration for the Tabula service

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the query safety policy matches block-listed keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive substring search over the whole query text.
    #[default]
    Substring,
    /// Only bare keyword/identifier tokens; literals and comments are skipped.
    Token,
}

pub const DEFAULT_BLOCKED_KEYWORDS: [&str; 9] = [
    "DROP", "TRUNCATE", "DELETE", "ALTER", "CREATE", "INSERT", "UPDATE", "GRANT", "REVOKE",
];

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// Relational backend connection pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://tabula@localhost:5432/tabula?sslmode=disable".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Ad-hoc query policy and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Applied when a request carries no timeout. `None` leaves it unbounded.
    pub default_timeout_ms: Option<u64>,
    /// Upper bound for any request timeout.
    pub max_timeout_ms: u64,
    pub blocked_keywords: Vec<String>,
    pub match_mode: MatchMode,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            max_timeout_ms: 300_000,
            blocked_keywords: DEFAULT_BLOCKED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            match_mode: MatchMode::Substring,
        }
    }
}

impl QueryConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete Tabula configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulaConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

impl TabulaConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    ///
    /// Formats are tried in turn; when none fits, the error carries what each
    /// parser reported.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        let json_err = match serde_json::from_str::<TabulaConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        // Try TOML
        let toml_err = match toml::from_str::<TabulaConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        // Try YAML
        let yaml_err = match serde_yaml::from_str::<TabulaConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        Err(ConfigError::ParseError(format!(
            "not valid JSON, TOML or YAML (json: {}; toml: {}; yaml: {})",
            json_err,
            toml_err.message(),
            yaml_err
        )))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `TABULA_*` environment variables on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("TABULA_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("TABULA_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("TABULA_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(level) = std::env::var("TABULA_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(ms) = std::env::var("TABULA_QUERY_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.query.default_timeout_ms = Some(ms).filter(|ms| *ms > 0);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url is required".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be > 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::ValidationError(
                "database.min_connections cannot be greater than max_connections".to_string(),
            ));
        }

        if let Some(default_ms) = self.query.default_timeout_ms {
            if default_ms > self.query.max_timeout_ms {
                return Err(ConfigError::ValidationError(
                    "query.default_timeout_ms cannot exceed max_timeout_ms".to_string(),
                ));
            }
        }

        if self.query.blocked_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "query.blocked_keywords cannot contain empty entries".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
