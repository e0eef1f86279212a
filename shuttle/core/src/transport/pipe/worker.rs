//! Pipe Worker
//!
//! Command loop run inside the forked worker process.

use std::fs::File;

use super::control::ControlMessage;
use crate::matrix;
use crate::payload;
use crate::transport::frame::{self, Header};
use crate::transport::TransportError;

/// Worker state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerState {
    WaitingForCommand,
    Processing,
    Exited,
}

/// Worker-side ends of the three pipes
pub(crate) struct PipeWorker {
    /// Control channel, read end
    control: File,
    /// Parent -> worker data channel, read end
    inbound: File,
    /// Worker -> parent data channel, write end
    outbound: File,
    chunk_size: usize,
    announced_edge: Option<usize>,
    scratch: Vec<u8>,
}

impl PipeWorker {
    pub(crate) fn new(control: File, inbound: File, outbound: File, chunk_size: usize) -> Self {
        Self {
            control,
            inbound,
            outbound,
            chunk_size,
            announced_edge: None,
            scratch: Vec::new(),
        }
    }

    /// Run until `Exit` arrives
    pub(crate) fn run(mut self) -> Result<(), TransportError> {
        let mut state = WorkerState::WaitingForCommand;
        let mut processed = 0u64;

        loop {
            state = match state {
                WorkerState::WaitingForCommand => self.next_command()?,
                WorkerState::Processing => {
                    self.process_one()?;
                    processed += 1;
                    // Self-posted Wait: back to idle
                    WorkerState::WaitingForCommand
                }
                WorkerState::Exited => {
                    tracing::debug!(processed, "Pipe worker exiting");
                    return Ok(());
                }
            };
        }
    }

    fn next_command(&mut self) -> Result<WorkerState, TransportError> {
        let message = match ControlMessage::read_from(&mut self.control) {
            Ok(message) => message,
            Err(TransportError::IncompleteTransfer { received: 0, .. }) => {
                tracing::warn!("Control channel closed without Exit");
                return Ok(WorkerState::Exited);
            }
            Err(e) => return Err(e),
        };

        Ok(match message {
            ControlMessage::Process => WorkerState::Processing,
            ControlMessage::Wait => WorkerState::WaitingForCommand,
            ControlMessage::Exit => WorkerState::Exited,
            ControlMessage::Announce { edge } => {
                let edge = edge as usize;
                self.scratch.reserve(matrix::payload_len(edge));
                self.announced_edge = Some(edge);
                WorkerState::WaitingForCommand
            }
        })
    }

    fn process_one(&mut self) -> Result<(), TransportError> {
        let edge = match frame::read_header(&mut self.inbound)? {
            Header::Edge(edge) => edge,
            Header::Shutdown => {
                return Err(TransportError::Protocol(
                    "Shutdown frame on pipe data channel".into(),
                ));
            }
        };

        if let Some(announced) = self.announced_edge {
            if announced != edge {
                return Err(TransportError::Protocol(format!(
                    "Data channel edge {edge} does not match announced edge {announced}"
                )));
            }
        }

        let mut m = frame::read_payload(&mut self.inbound, edge, &mut self.scratch)?;
        payload::transform_in_place(m.as_mut_slice());
        frame::write_matrix(&mut self.outbound, &m, self.chunk_size)?;

        tracing::trace!(edge, "Pipe worker replied");
        Ok(())
    }
}
