//! Transport Configuration
//!
//! Configuration types for selecting and configuring transport mechanisms.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::matrix::ELEMENT_SIZE;

/// Bytes reserved at the start of the shared segment for the element count
pub const SEGMENT_HEADER_SIZE: usize = 4;

/// Transport type selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Control pipe plus two data pipes
    #[default]
    Pipe,

    /// Fixed-size shared segment with semaphore handshaking
    SharedMemory,

    /// Loopback TCP connection with length-prefixed frames
    Socket,
}

impl TransportType {
    /// Every transport, in report order
    pub const ALL: [TransportType; 3] = [Self::Pipe, Self::SharedMemory, Self::Socket];
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => write!(f, "pipe"),
            Self::SharedMemory => write!(f, "shm"),
            Self::Socket => write!(f, "socket"),
        }
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pipe" | "pipes" => Ok(Self::Pipe),
            "shm" | "shared_memory" | "shared-memory" | "sharedmemory" => Ok(Self::SharedMemory),
            "socket" | "tcp" => Ok(Self::Socket),
            other => Err(format!(
                "unknown transport '{other}' (expected pipe, shm or socket)"
            )),
        }
    }
}

/// Pipe transport settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Maximum bytes per write call on the data pipes
    ///
    /// Defaults to `PIPE_BUF`, the atomic-write limit.
    pub chunk_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            chunk_size: libc::PIPE_BUF,
        }
    }
}

/// Shared-memory transport settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMemoryConfig {
    /// Name of the shared memory object (leading `/`)
    pub segment_name: String,

    /// Prefix for the three semaphore names
    ///
    /// Semaphores are `<prefix>_p2c`, `<prefix>_c2p` and `<prefix>_exit`.
    pub semaphore_prefix: String,

    /// Size of the mapped segment in bytes, header included
    pub segment_size: usize,
}

impl Default for SharedMemoryConfig {
    fn default() -> Self {
        Self {
            segment_name: "/shuttle_segment".into(),
            semaphore_prefix: "/shuttle".into(),
            segment_size: 64 * 1024,
        }
    }
}

impl SharedMemoryConfig {
    /// Default settings with randomly suffixed object names
    ///
    /// Lets several sessions (or test processes) run side by side without
    /// fighting over the well-known names.
    #[must_use]
    pub fn unique() -> Self {
        let bytes: [u8; 4] = rand::thread_rng().gen();
        let suffix = hex::encode(bytes);
        Self {
            segment_name: format!("/shuttle_{suffix}"),
            semaphore_prefix: format!("/shuttle_{suffix}"),
            ..Default::default()
        }
    }

    /// Same names, different segment size
    #[must_use]
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    /// Number of elements that fit in one batch
    #[must_use]
    pub fn batch_capacity(&self) -> usize {
        self.segment_size.saturating_sub(SEGMENT_HEADER_SIZE) / ELEMENT_SIZE
    }

    /// Semaphore the parent posts when the segment is ready for the worker
    #[must_use]
    pub fn parent_to_child_name(&self) -> String {
        format!("{}_p2c", self.semaphore_prefix)
    }

    /// Semaphore the worker posts when the segment is ready for the parent
    #[must_use]
    pub fn child_to_parent_name(&self) -> String {
        format!("{}_c2p", self.semaphore_prefix)
    }

    /// Semaphore the parent posts to request worker exit
    #[must_use]
    pub fn exit_name(&self) -> String {
        format!("{}_exit", self.semaphore_prefix)
    }
}

/// Socket transport settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Loopback address to bind
    pub host: IpAddr,

    /// TCP port (0 = let the OS choose)
    pub port: u16,

    /// How many times the worker tries to connect
    pub connect_attempts: u32,

    /// Pause between connection attempts in milliseconds
    pub connect_retry_delay_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            connect_attempts: 1000,
            connect_retry_delay_ms: 1,
        }
    }
}

impl SocketConfig {
    /// Default settings on an OS-assigned port
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Default::default()
        }
    }
}

/// Transport configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Which transport to use
    pub transport: TransportType,

    /// Pipe settings
    pub pipe: PipeConfig,

    /// Shared-memory settings
    pub shared_memory: SharedMemoryConfig,

    /// Socket settings
    pub socket: SocketConfig,
}

impl TransportConfig {
    /// Default configuration for one transport
    #[must_use]
    pub fn for_type(transport: TransportType) -> Self {
        Self {
            transport,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SHUTTLE_TRANSPORT`: "pipe", "shm", "socket"
    /// - `SHUTTLE_PIPE_CHUNK`: Bytes per pipe write call
    /// - `SHUTTLE_SHM_NAME`: Shared memory object name
    /// - `SHUTTLE_SEM_PREFIX`: Semaphore name prefix
    /// - `SHUTTLE_SEGMENT_SIZE`: Shared segment size in bytes
    /// - `SHUTTLE_PORT`: TCP port for the socket transport
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Some(transport) = std::env::var("SHUTTLE_TRANSPORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.transport = transport;
        }
        if let Some(chunk) = env_parse("SHUTTLE_PIPE_CHUNK") {
            self.pipe.chunk_size = chunk;
        }
        if let Ok(name) = std::env::var("SHUTTLE_SHM_NAME") {
            self.shared_memory.segment_name = name;
        }
        if let Ok(prefix) = std::env::var("SHUTTLE_SEM_PREFIX") {
            self.shared_memory.semaphore_prefix = prefix;
        }
        if let Some(size) = env_parse("SHUTTLE_SEGMENT_SIZE") {
            self.shared_memory.segment_size = size;
        }
        if let Some(port) = env_parse("SHUTTLE_PORT") {
            self.socket.port = port;
        }
    }

    /// Check values that would make a session impossible
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.pipe.chunk_size == 0 {
            return Err("pipe chunk_size must be greater than 0".into());
        }
        if self.shared_memory.batch_capacity() == 0 {
            return Err(format!(
                "shared_memory segment_size {} leaves no room for elements after the {}-byte header",
                self.shared_memory.segment_size, SEGMENT_HEADER_SIZE
            ));
        }
        if !self.shared_memory.segment_name.starts_with('/') {
            return Err("shared_memory segment_name must start with '/'".into());
        }
        if !self.shared_memory.semaphore_prefix.starts_with('/') {
            return Err("shared_memory semaphore_prefix must start with '/'".into());
        }
        if !self.socket.host.is_loopback() {
            return Err(format!("socket host {} is not a loopback address", self.socket.host));
        }
        if self.socket.connect_attempts == 0 {
            return Err("socket connect_attempts must be greater than 0".into());
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_default() {
        assert_eq!(TransportType::default(), TransportType::Pipe);
    }

    #[test]
    fn test_transport_type_parse() {
        assert_eq!("PIPE".parse::<TransportType>().unwrap(), TransportType::Pipe);
        assert_eq!(
            "shared-memory".parse::<TransportType>().unwrap(),
            TransportType::SharedMemory
        );
        assert_eq!("tcp".parse::<TransportType>().unwrap(), TransportType::Socket);
        assert!("carrier-pigeon".parse::<TransportType>().is_err());
    }

    #[test]
    fn test_transport_type_display_parses_back() {
        for t in TransportType::ALL {
            assert_eq!(t.to_string().parse::<TransportType>().unwrap(), t);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = TransportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket.port, 8080);
        assert_eq!(config.pipe.chunk_size, libc::PIPE_BUF);
    }

    #[test]
    fn test_batch_capacity() {
        let shm = SharedMemoryConfig::default().with_segment_size(404);
        assert_eq!(shm.batch_capacity(), 100);

        let tiny = SharedMemoryConfig::default().with_segment_size(7);
        assert_eq!(tiny.batch_capacity(), 0);
    }

    #[test]
    fn test_validate_rejects_header_only_segment() {
        let mut config = TransportConfig::default();
        config.shared_memory.segment_size = SEGMENT_HEADER_SIZE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_loopback_host() {
        let mut config = TransportConfig::default();
        config.socket.host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unique_names_differ() {
        let a = SharedMemoryConfig::unique();
        let b = SharedMemoryConfig::unique();
        assert_ne!(a.segment_name, b.segment_name);
        assert!(a.parent_to_child_name().ends_with("_p2c"));
        assert!(a.exit_name().starts_with('/'));
    }
}
