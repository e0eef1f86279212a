//! Pipe Transport
//!
//! A persistent worker driven by a command protocol over a control pipe,
//! with bulk data on two dedicated data pipes.
//!
//! # Topology
//!
//! ```text
//! ┌──────────────┐      control (P/W/E/A)      ┌──────────────┐
//! │              ├────────────────────────────►│              │
//! │    Parent    │   data in (edge + payload)  │    Worker    │
//! │              ├────────────────────────────►│              │
//! │              │   data out (edge + payload) │              │
//! │              │◄────────────────────────────┤              │
//! └──────────────┘                             └──────────────┘
//! ```
//!
//! Bulk writes are split into `PIPE_BUF`-sized calls. The worker only sees
//! `Exit` while idle; shutdown never interrupts a transfer.

mod control;
mod worker;

pub use control::ControlMessage;

use std::fs::File;
use std::os::fd::OwnedFd;

use nix::unistd::Pid;

use super::config::PipeConfig;
use super::process::{fork_worker, reap_worker};
use super::traits::{ensure_active, ensure_startable, SessionState, Transport, TransportError};
use super::frame;
use crate::matrix::Matrix;
use worker::PipeWorker;

const NAME: &str = "Pipe";

/// Parent-side ends of the three pipes
struct ParentChannels {
    /// Control channel, write end
    control: File,
    /// Parent -> worker data channel, write end
    to_worker: File,
    /// Worker -> parent data channel, read end
    from_worker: File,
}

/// Pipe-based transport to a forked worker
pub struct PipeTransport {
    config: PipeConfig,
    state: SessionState,
    channels: Option<ParentChannels>,
    worker: Option<Pid>,
    /// Edge length last announced to the worker
    announced_edge: Option<usize>,
}

impl PipeTransport {
    /// Create a transport with the given configuration
    #[must_use]
    pub fn new(config: PipeConfig) -> Self {
        Self {
            config,
            state: SessionState::Uninitialized,
            channels: None,
            worker: None,
            announced_edge: None,
        }
    }

    fn open_pipe(label: &str) -> Result<(File, File), TransportError> {
        let (read_end, write_end): (OwnedFd, OwnedFd) = nix::unistd::pipe()
            .map_err(|e| TransportError::acquire(format!("{label} pipe"), e.into()))?;
        Ok((File::from(read_end), File::from(write_end)))
    }
}

impl Default for PipeTransport {
    fn default() -> Self {
        Self::new(PipeConfig::default())
    }
}

impl Transport for PipeTransport {
    fn start_session(&mut self) -> Result<(), TransportError> {
        ensure_startable(NAME, self.state)?;

        let (control_rx, control_tx) = Self::open_pipe("control")?;
        let (inbound_rx, inbound_tx) = Self::open_pipe("parent-to-worker data")?;
        let (outbound_rx, outbound_tx) = Self::open_pipe("worker-to-parent data")?;

        let parent_side = ParentChannels {
            control: control_tx,
            to_worker: inbound_tx,
            from_worker: outbound_rx,
        };
        let worker = PipeWorker::new(control_rx, inbound_rx, outbound_tx, self.config.chunk_size);

        let (pid, channels) = fork_worker("pipe", parent_side, move || worker.run())?;

        self.channels = Some(channels);
        self.worker = Some(pid);
        self.state = SessionState::Active;

        tracing::info!(transport = NAME, pid = pid.as_raw(), "Session started");
        Ok(())
    }

    fn request(&mut self, matrix: &Matrix) -> Result<Matrix, TransportError> {
        ensure_active(NAME, self.state)?;
        let channels = self
            .channels
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("Pipe channels missing".into()))?;

        // Nothing reaches the control pipe for a request the frame would refuse
        let edge = matrix.edge();
        frame::check_edge(edge)?;
        if self.announced_edge != Some(edge) {
            let announced = u32::try_from(edge).map_err(|_| {
                TransportError::Protocol(format!("Edge length {edge} too large to announce"))
            })?;
            ControlMessage::Announce { edge: announced }.write_to(&mut channels.control)?;
            self.announced_edge = Some(edge);
        }

        ControlMessage::Process.write_to(&mut channels.control)?;
        frame::write_matrix(&mut channels.to_worker, matrix, self.config.chunk_size)?;
        let reply = frame::read_matrix(&mut channels.from_worker)?;

        if reply.edge() != edge {
            return Err(TransportError::Protocol(format!(
                "Reply edge {} does not match request edge {edge}",
                reply.edge()
            )));
        }

        tracing::debug!(transport = NAME, edge, "Request complete");
        Ok(reply)
    }

    fn end_session(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Active {
            self.state = SessionState::Terminated;
            return Ok(());
        }
        self.state = SessionState::Terminated;

        if let Some(mut channels) = self.channels.take() {
            if let Err(e) = ControlMessage::Exit.write_to(&mut channels.control) {
                tracing::warn!(transport = NAME, error = %e, "Failed to send Exit");
            }
            // Closing the parent ends here lets a worker that missed Exit see EOF
            drop(channels);
        }

        let result = match self.worker.take() {
            Some(pid) => reap_worker("pipe", pid),
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

impl Drop for PipeTransport {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            if let Err(e) = self.end_session() {
                tracing::warn!(transport = NAME, error = %e, "Session cleanup on drop failed");
            }
        }
    }
}
