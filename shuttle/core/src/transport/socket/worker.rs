//! Socket Worker
//!
//! Connects back to the parent's listener and serves frames until the
//! shutdown sentinel arrives.

use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use crate::payload;
use crate::transport::frame::{self, Header};
use crate::transport::TransportError;

/// Worker side of the connection
pub(crate) struct SocketWorker {
    stream: TcpStream,
    scratch: Vec<u8>,
}

impl SocketWorker {
    /// Connect to `addr`, retrying up to `attempts` times
    pub(crate) fn connect(
        addr: SocketAddr,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, TransportError> {
        let mut last_error = None;

        for attempt in 1..=attempts.max(1) {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::debug!(%addr, attempt, "Socket worker connected");
                    return Ok(Self {
                        stream,
                        scratch: Vec::new(),
                    });
                }
                Err(e) => {
                    tracing::trace!(%addr, attempt, error = %e, "Connect failed, retrying");
                    last_error = Some(e);
                    thread::sleep(retry_delay);
                }
            }
        }

        Err(TransportError::acquire(
            format!("connection to {addr}"),
            last_error.unwrap_or_else(|| std::io::ErrorKind::NotConnected.into()),
        ))
    }

    /// Serve requests until the sentinel frame (or end-of-stream) arrives
    pub(crate) fn run(mut self) -> Result<(), TransportError> {
        let mut requests = 0u64;

        loop {
            let edge = match frame::read_header(&mut self.stream) {
                Ok(Header::Edge(edge)) => edge,
                Ok(Header::Shutdown) => break,
                Err(TransportError::IncompleteTransfer { received: 0, .. }) => {
                    tracing::warn!("Connection closed without shutdown frame");
                    break;
                }
                Err(e) => return Err(e),
            };

            let mut m = frame::read_payload(&mut self.stream, edge, &mut self.scratch)?;
            payload::transform_in_place(m.as_mut_slice());
            frame::write_matrix(&mut self.stream, &m, usize::MAX)?;

            requests += 1;
            tracing::trace!(edge, "Socket worker replied");
        }

        tracing::debug!(requests, "Socket worker exiting");
        Ok(())
    }
}
