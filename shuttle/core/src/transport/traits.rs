//! Transport Traits
//!
//! The contract every transport satisfies, its session state machine and
//! the shared error type.

use std::fmt;

use thiserror::Error;

use crate::matrix::Matrix;

/// Lifecycle of one parent/worker session
///
/// ```text
/// Uninitialized --start_session--> Active --end_session--> Terminated
/// ```
///
/// A terminated session is never restarted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No worker has been spawned yet
    Uninitialized,
    /// Worker running and channel established
    Active,
    /// Worker reaped and every OS handle released
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Creating an OS resource failed (pipe, socket, fork, shm, semaphore)
    #[error("Failed to acquire {resource}: {source}")]
    ResourceAcquisition {
        /// What was being created
        resource: String,
        /// The underlying OS error
        source: std::io::Error,
    },

    /// Peer closed the channel before the expected byte count arrived
    #[error("Incomplete transfer: expected {expected} bytes, received {received}")]
    IncompleteTransfer {
        /// Bytes the protocol required
        expected: usize,
        /// Bytes actually received before end-of-stream
        received: usize,
    },

    /// IO error from the underlying channel
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Byte length does not match the matrix shape
    #[error("Codec error: expected {expected} bytes, got {actual}")]
    Codec {
        /// Byte length implied by the edge length
        expected: usize,
        /// Byte length supplied
        actual: usize,
    },

    /// Transport not in expected state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The worker process did not exit cleanly
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

impl TransportError {
    /// Wrap an OS error raised while acquiring `resource`
    pub fn acquire(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::ResourceAcquisition {
            resource: resource.into(),
            source,
        }
    }
}

impl From<nix::Error> for TransportError {
    fn from(err: nix::Error) -> Self {
        Self::Io(std::io::Error::from(err))
    }
}

/// Request/response transport to a persistent worker process
///
/// One caller drives a session, with exactly one request in flight at a time.
pub trait Transport {
    /// Spawn the worker and establish the channel
    ///
    /// Only valid on an `Uninitialized` session.
    fn start_session(&mut self) -> Result<(), TransportError>;

    /// Ship `matrix` to the worker and return its transformed reply
    ///
    /// The reply has the same shape as the input.
    fn request(&mut self, matrix: &Matrix) -> Result<Matrix, TransportError>;

    /// Signal the worker to exit, reap it and release every OS handle
    ///
    /// Calling this on a terminated session is a no-op.
    fn end_session(&mut self) -> Result<(), TransportError>;

    /// Stable identifier used in reports
    fn name(&self) -> &'static str;

    /// Current session state
    fn state(&self) -> SessionState;

    /// Process id of the worker while the session is active
    fn worker_pid(&self) -> Option<i32>;
}

/// Check that a session is active before a request
pub(crate) fn ensure_active(name: &str, state: SessionState) -> Result<(), TransportError> {
    if state != SessionState::Active {
        return Err(TransportError::InvalidState(format!(
            "{name} session is {state}, expected active"
        )));
    }
    Ok(())
}

/// Check that a session can be started
pub(crate) fn ensure_startable(name: &str, state: SessionState) -> Result<(), TransportError> {
    if state != SessionState::Uninitialized {
        return Err(TransportError::InvalidState(format!(
            "{name} session is {state}, cannot start"
        )));
    }
    Ok(())
}
