//! Transport Layer for Parent-Worker IPC
//!
//! Three ways of shipping a matrix to a persistent worker process and back,
//! all behind the [`Transport`] contract:
//! - [`PipeTransport`]: control pipe plus two data pipes
//! - [`SharedMemoryTransport`]: one mapped segment, batched, semaphore handoff
//! - [`SocketTransport`]: one loopback TCP connection, length-prefixed frames
//!
//! # Session Model
//!
//! Every transport forks its worker in `start_session`, serves one blocking
//! request at a time, and reaps the worker in `end_session`. None of the
//! blocking calls has a timeout: a peer that stops responding hangs the
//! caller.
//!
//! # Security
//!
//! - Shared memory objects and semaphores are created with 0600 permissions
//! - The socket listener binds loopback only and accepts a single connection

pub mod config;
pub mod factory;
pub mod frame;
pub mod pipe;
pub mod process;
pub mod shared_memory;
pub mod socket;
pub mod stream;
pub mod traits;

// Re-exports for convenience
pub use config::{PipeConfig, SharedMemoryConfig, SocketConfig, TransportConfig, TransportType};
pub use factory::create_transport;
pub use frame::{Frame, Header, MAX_EDGE_LENGTH, SHUTDOWN_SENTINEL};
pub use pipe::PipeTransport;
pub use shared_memory::{batch_ranges, SharedMemoryTransport};
pub use socket::SocketTransport;
pub use traits::{SessionState, Transport, TransportError};
