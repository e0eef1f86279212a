//! Shuttle Core - Matrix Round Trips over Three IPC Transports
//!
//! This crate ships a square `f32` matrix from a parent process to a
//! persistent forked worker, has the worker square every element, and ships
//! the result back. The same request/response contract is implemented three
//! ways so the mechanisms can be compared.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Parent process                          │
//! │      generate ──► Transport::request ──► approximately_equal     │
//! │                               │                                  │
//! │        ┌──────────────────────┼───────────────────────┐          │
//! │        │                      │                       │          │
//! │  ┌─────┴──────┐      ┌────────┴────────┐      ┌───────┴──────┐   │
//! │  │    Pipe    │      │  SharedMemory   │      │    Socket    │   │
//! │  │ 3 × pipe() │      │ shm + 3 × sem_t │      │ loopback TCP │   │
//! │  └─────┬──────┘      └────────┬────────┘      └───────┬──────┘   │
//! └────────┼──────────────────────┼───────────────────────┼──────────┘
//!          │ fork                 │ fork                  │ fork
//! ┌────────┴──────┐      ┌────────┴────────┐      ┌───────┴──────┐
//! │ command loop  │      │   batch loop    │      │  frame loop  │
//! └───────────────┘      └─────────────────┘      └──────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use shuttle_core::{payload, PipeTransport, Transport};
//!
//! let mut transport = PipeTransport::default();
//! transport.start_session()?;
//!
//! let request = payload::generate_seeded(4, 42);
//! let reply = transport.request(&request)?;
//! assert!(payload::approximately_equal(&reply, &payload::transform(&request)));
//!
//! transport.end_session()?;
//! # Ok::<(), shuttle_core::TransportError>(())
//! ```
//!
//! # Module Overview
//!
//! - [`matrix`]: The square matrix type and its byte codec
//! - [`payload`]: Random matrix generation, the reference transform, tolerance checks
//! - [`transport`]: The transport contract and its three implementations
//! - [`config`]: TOML configuration file, environment and CLI overrides
//!
//! # Process Model
//!
//! Workers are created with `fork`. Call `start_session` before spawning any
//! threads of your own where possible; the worker only runs code that owns
//! its handles and never returns into the caller's stack.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod matrix;
pub mod payload;
pub mod transport;

// Re-exports for convenience
pub use matrix::Matrix;
pub use transport::{
    create_transport, PipeConfig, PipeTransport, SessionState, SharedMemoryConfig,
    SharedMemoryTransport, SocketConfig, SocketTransport, Transport, TransportConfig,
    TransportError, TransportType,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BenchSettings, ConfigError,
    ConfigOverrides, ConfigSource, ShuttleConfigFile, ShuttleToml,
};
