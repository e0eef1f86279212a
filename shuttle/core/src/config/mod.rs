//! TOML Configuration File Support
//!
//! Centralized configuration loading for the benchmark driver, supporting a
//! TOML configuration file at `~/.config/shuttle/bench.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/shuttle/bench.toml` (typically `~/.config/shuttle/bench.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [pipe]
//! chunk_size = 4096
//!
//! [shared_memory]
//! segment_name = "/shuttle_segment"
//! semaphore_prefix = "/shuttle"
//! segment_size = 65536
//!
//! [socket]
//! host = "127.0.0.1"
//! port = 8080
//! connect_attempts = 1000
//! connect_retry_delay_ms = 1
//!
//! [bench]
//! transports = ["pipe", "shared_memory", "socket"]
//! sizes = [4, 64, 512]
//! iterations = 100
//! seed = 42
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::config::{TransportConfig, TransportType};
use crate::transport::frame::MAX_EDGE_LENGTH;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Pipe section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeToml {
    /// Bytes per write call on the data pipes
    pub chunk_size: Option<usize>,
}

/// Shared memory section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedMemoryToml {
    /// Shared memory object name
    pub segment_name: Option<String>,

    /// Prefix for the semaphore names
    pub semaphore_prefix: Option<String>,

    /// Segment size in bytes, header included
    pub segment_size: Option<usize>,
}

/// Socket section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketToml {
    /// Loopback address to bind
    pub host: Option<IpAddr>,

    /// TCP port (0 = OS-assigned)
    pub port: Option<u16>,

    /// Worker connection attempts
    pub connect_attempts: Option<u32>,

    /// Pause between connection attempts in milliseconds
    pub connect_retry_delay_ms: Option<u64>,
}

/// Bench section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchToml {
    /// Transports to run, in order
    pub transports: Option<Vec<TransportType>>,

    /// Matrix edge lengths to time
    pub sizes: Option<Vec<usize>>,

    /// Round trips per size
    pub iterations: Option<u32>,

    /// Seed for reproducible payloads
    pub seed: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuttleToml {
    /// Pipe transport section
    pub pipe: PipeToml,

    /// Shared memory transport section
    pub shared_memory: SharedMemoryToml,

    /// Socket transport section
    pub socket: SocketToml,

    /// Benchmark run section
    pub bench: BenchToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// What the benchmark runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchSettings {
    /// Transports to run, in order
    pub transports: Vec<TransportType>,

    /// Matrix edge lengths to time
    pub sizes: Vec<usize>,

    /// Round trips per size
    pub iterations: u32,

    /// Seed for reproducible payloads (`None` = thread RNG)
    pub seed: Option<u64>,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            transports: TransportType::ALL.to_vec(),
            sizes: vec![4],
            iterations: 100,
            seed: None,
        }
    }
}

/// Centralized configuration for the benchmark
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct ShuttleConfigFile {
    /// Per-transport settings
    pub transport: TransportConfig,

    /// Benchmark run settings
    pub bench: BenchSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: Option<ConfigSource>,
}

impl ShuttleConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source.unwrap_or(ConfigSource::Default)
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = Some(source);
    }

    /// Configuration for running one specific transport
    #[must_use]
    pub fn transport_config(&self, transport: TransportType) -> TransportConfig {
        TransportConfig {
            transport,
            ..self.transport.clone()
        }
    }

    /// Check every value that would make a run impossible
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport
            .validate()
            .map_err(ConfigError::ValidationError)?;

        if self.bench.transports.is_empty() {
            return Err(ConfigError::ValidationError(
                "bench transports must not be empty".into(),
            ));
        }
        if self.bench.sizes.is_empty() {
            return Err(ConfigError::ValidationError(
                "bench sizes must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .bench
            .sizes
            .iter()
            .find(|&&edge| edge == 0 || edge > MAX_EDGE_LENGTH)
        {
            return Err(ConfigError::ValidationError(format!(
                "bench size {bad} outside 1..={MAX_EDGE_LENGTH}"
            )));
        }
        if self.bench.iterations == 0 {
            return Err(ConfigError::ValidationError(
                "bench iterations must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/shuttle/bench.toml` or
/// `~/.config/shuttle/bench.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("shuttle").join("bench.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ShuttleConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ShuttleConfigFile, ConfigError> {
    let mut config = ShuttleConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ShuttleToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.set_source(ConfigSource::File);

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Environment overrides file values
    apply_env_config(&mut config);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ShuttleConfigFile, toml: &ShuttleToml) {
    if let Some(chunk) = toml.pipe.chunk_size {
        config.transport.pipe.chunk_size = chunk;
    }

    let shm = &mut config.transport.shared_memory;
    if let Some(ref name) = toml.shared_memory.segment_name {
        shm.segment_name = name.clone();
    }
    if let Some(ref prefix) = toml.shared_memory.semaphore_prefix {
        shm.semaphore_prefix = prefix.clone();
    }
    if let Some(size) = toml.shared_memory.segment_size {
        shm.segment_size = size;
    }

    let socket = &mut config.transport.socket;
    if let Some(host) = toml.socket.host {
        socket.host = host;
    }
    if let Some(port) = toml.socket.port {
        socket.port = port;
    }
    if let Some(attempts) = toml.socket.connect_attempts {
        socket.connect_attempts = attempts;
    }
    if let Some(delay) = toml.socket.connect_retry_delay_ms {
        socket.connect_retry_delay_ms = delay;
    }

    if let Some(ref transports) = toml.bench.transports {
        config.bench.transports = transports.clone();
    }
    if let Some(ref sizes) = toml.bench.sizes {
        config.bench.sizes = sizes.clone();
    }
    if let Some(iterations) = toml.bench.iterations {
        config.bench.iterations = iterations;
    }
    if toml.bench.seed.is_some() {
        config.bench.seed = toml.bench.seed;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ShuttleConfigFile) {
    let before = config.transport.clone();
    config.transport.apply_env();
    if config.transport != before {
        config.set_source(ConfigSource::Env);
    }

    // A single transport named in the environment narrows the run to it
    if let Some(transport) = std::env::var("SHUTTLE_TRANSPORT")
        .ok()
        .and_then(|v| v.parse::<TransportType>().ok())
    {
        config.bench.transports = vec![transport];
        config.set_source(ConfigSource::Env);
    }
    if let Ok(iterations) = std::env::var("SHUTTLE_ITERATIONS") {
        if let Ok(n) = iterations.parse::<u32>() {
            config.bench.iterations = n;
            config.set_source(ConfigSource::Env);
        }
    }
    if let Ok(seed) = std::env::var("SHUTTLE_SEED") {
        if let Ok(s) = seed.parse::<u64>() {
            config.bench.seed = Some(s);
            config.set_source(ConfigSource::Env);
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Transports to run
    pub transports: Option<Vec<TransportType>>,

    /// Matrix edge lengths
    pub sizes: Option<Vec<usize>>,

    /// Round trips per size
    pub iterations: Option<u32>,

    /// Payload seed
    pub seed: Option<u64>,

    /// Socket port
    pub port: Option<u16>,

    /// Shared segment size in bytes
    pub segment_size: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set transports override
    #[must_use]
    pub fn with_transports(mut self, transports: Vec<TransportType>) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Set sizes override
    #[must_use]
    pub fn with_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.sizes = Some(sizes);
        self
    }

    /// Set iterations override
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Set seed override
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set socket port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set segment size override
    #[must_use]
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = Some(size);
        self
    }

    fn is_empty(&self) -> bool {
        self.transports.is_none()
            && self.sizes.is_none()
            && self.iterations.is_none()
            && self.seed.is_none()
            && self.port.is_none()
            && self.segment_size.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ShuttleConfigFile) {
        if !self.is_empty() {
            config.set_source(ConfigSource::Cli);
        }

        if let Some(ref transports) = self.transports {
            config.bench.transports = transports.clone();
        }
        if let Some(ref sizes) = self.sizes {
            config.bench.sizes = sizes.clone();
        }
        if let Some(iterations) = self.iterations {
            config.bench.iterations = iterations;
        }
        if self.seed.is_some() {
            config.bench.seed = self.seed;
        }
        if let Some(port) = self.port {
            config.transport.socket.port = port;
        }
        if let Some(size) = self.segment_size {
            config.transport.shared_memory.segment_size = size;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
