//! Configuration for the SAGE daemon

use sage_dispatcher::{SigningCredential, DEFAULT_TOKEN_TTL_SECS};
use sage_evaluator::{ScoringKind, DEFAULT_NARROW_MARGIN};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Decision and execution engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Enrolled signers for prepare/execute
    #[serde(default)]
    pub signing: SigningConfig,

    /// Entity fixture loaded at boot
    #[serde(default)]
    pub seed: SeedConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8087)),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a confirmation token
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,

    /// How intent, entity and situation scores combine
    #[serde(default)]
    pub scoring: ScoringKind,

    /// Relative margin below which a threshold pass counts as narrow
    #[serde(default = "default_narrow_margin")]
    pub narrow_margin: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            scoring: ScoringKind::default(),
            narrow_margin: DEFAULT_NARROW_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub credentials: Vec<SigningCredential>,

    /// One-time code time step
    #[serde(default = "default_code_step")]
    pub code_step_secs: u64,

    /// Steps of clock skew tolerated either side
    #[serde(default = "default_code_skew")]
    pub code_skew_steps: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            code_step_secs: default_code_step(),
            code_skew_steps: default_code_skew(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    /// JSON file of entity snapshots
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_token_ttl() -> i64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_narrow_margin() -> f64 {
    DEFAULT_NARROW_MARGIN
}

fn default_code_step() -> u64 {
    30
}

fn default_code_skew() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Defaults, then the optional file, then `SAGE_` environment variables.
    ///
    /// Nested keys use a double underscore: `SAGE_ENGINE__TOKEN_TTL_SECS=60`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
