//! Socket Transport
//!
//! The parent listens on a loopback TCP port, the forked worker connects
//! back, and that one connection carries every request of the session.
//!
//! ```text
//! Parent                                  Worker
//!   bind + listen
//!   fork ────────────────────────────────► connect (retrying)
//!   accept ◄──────────────────────────────┘
//!   [edge][payload] ─────────────────────► transform
//!   [edge][payload] ◄─────────────────────┘
//!   ...
//!   [-25] ───────────────────────────────► exit
//!   waitpid
//! ```
//!
//! Frames are described in [`crate::transport::frame`].

mod worker;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use nix::unistd::Pid;

use super::config::SocketConfig;
use super::frame;
use super::process::{fork_worker, reap_worker};
use super::traits::{ensure_active, ensure_startable, SessionState, Transport, TransportError};
use crate::matrix::Matrix;
use worker::SocketWorker;

const NAME: &str = "Socket";

/// Loopback TCP transport to a forked worker
pub struct SocketTransport {
    config: SocketConfig,
    state: SessionState,
    stream: Option<TcpStream>,
    worker: Option<Pid>,
    local_addr: Option<SocketAddr>,
}

impl SocketTransport {
    /// Create a transport with the given configuration
    #[must_use]
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            state: SessionState::Uninitialized,
            stream: None,
            worker: None,
            local_addr: None,
        }
    }

    /// Address the listener was bound to, once the session has started
    ///
    /// Differs from the configured port when that port is 0.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn bind(&self) -> Result<TcpListener, TransportError> {
        let addr = SocketAddr::new(self.config.host, self.config.port);
        TcpListener::bind(addr)
            .map_err(|e| TransportError::acquire(format!("socket listener on {addr}"), e))
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new(SocketConfig::default())
    }
}

impl Transport for SocketTransport {
    fn start_session(&mut self) -> Result<(), TransportError> {
        ensure_startable(NAME, self.state)?;

        let listener = self.bind()?;
        let addr = listener.local_addr()?;

        let attempts = self.config.connect_attempts;
        let retry_delay = Duration::from_millis(self.config.connect_retry_delay_ms);
        let (pid, listener) = fork_worker("socket", listener, move || {
            SocketWorker::connect(addr, attempts, retry_delay)?.run()
        })?;
        self.worker = Some(pid);

        // One connection per session; stop listening once it is accepted
        let accepted = listener.accept();
        drop(listener);

        let stream = match accepted {
            Ok((stream, peer)) => {
                tracing::debug!(transport = NAME, %peer, "Worker connection accepted");
                stream
            }
            Err(e) => {
                self.state = SessionState::Terminated;
                if let Some(pid) = self.worker.take() {
                    if let Err(reap) = reap_worker("socket", pid) {
                        tracing::warn!(transport = NAME, error = %reap, "Failed to reap worker");
                    }
                }
                return Err(TransportError::acquire(format!("connection on {addr}"), e));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(transport = NAME, error = %e, "Failed to set TCP_NODELAY");
        }

        self.stream = Some(stream);
        self.local_addr = Some(addr);
        self.state = SessionState::Active;

        tracing::info!(transport = NAME, pid = pid.as_raw(), %addr, "Session started");
        Ok(())
    }

    fn request(&mut self, matrix: &Matrix) -> Result<Matrix, TransportError> {
        ensure_active(NAME, self.state)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("Socket connection missing".into()))?;

        frame::write_matrix(stream, matrix, usize::MAX)?;
        let reply = frame::read_matrix(stream)?;

        if reply.edge() != matrix.edge() {
            return Err(TransportError::Protocol(format!(
                "Reply edge {} does not match request edge {}",
                reply.edge(),
                matrix.edge()
            )));
        }

        tracing::debug!(transport = NAME, edge = matrix.edge(), "Request complete");
        Ok(reply)
    }

    fn end_session(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Active {
            self.state = SessionState::Terminated;
            return Ok(());
        }
        self.state = SessionState::Terminated;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = frame::write_shutdown(&mut stream) {
                tracing::warn!(transport = NAME, error = %e, "Failed to send shutdown frame");
            }
            // Closing our end lets a worker that missed the sentinel see EOF
            drop(stream);
        }

        let result = match self.worker.take() {
            Some(pid) => reap_worker("socket", pid),
            None => Ok(()),
        };

        tracing::info!(transport = NAME, "Session ended");
        result
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn worker_pid(&self) -> Option<i32> {
        self.worker.map(Pid::as_raw)
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            if let Err(e) = self.end_session() {
                tracing::warn!(transport = NAME, error = %e, "Session cleanup on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;

    #[test]
    fn test_request_before_start_is_invalid() {
        let mut transport = SocketTransport::new(SocketConfig::ephemeral());
        let result = transport.request(&Matrix::zeros(2));
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
        assert!(transport.local_addr().is_none());
    }

    #[test]
    fn test_ephemeral_port_resolved() {
        let mut transport = SocketTransport::new(SocketConfig::ephemeral());
        transport.start_session().unwrap();

        let addr = transport.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        transport.end_session().unwrap();
    }

    #[test]
    fn test_connection_reused_across_requests() {
        let mut transport = SocketTransport::new(SocketConfig::ephemeral());
        transport.start_session().unwrap();
        let pid = transport.worker_pid();

        for (edge, seed) in [(2, 1), (6, 2), (2, 3)] {
            let m = payload::generate_seeded(edge, seed);
            let reply = transport.request(&m).unwrap();
            assert!(payload::approximately_equal(&reply, &payload::transform(&m)));
            assert_eq!(transport.worker_pid(), pid);
        }

        transport.end_session().unwrap();
        assert_eq!(transport.worker_pid(), None);
    }

    #[test]
    fn test_port_in_use_is_acquisition_error() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let mut transport = SocketTransport::new(SocketConfig {
            port,
            ..SocketConfig::ephemeral()
        });
        assert!(matches!(
            transport.start_session(),
            Err(TransportError::ResourceAcquisition { .. })
        ));
        assert_eq!(transport.state(), SessionState::Uninitialized);
    }
}
