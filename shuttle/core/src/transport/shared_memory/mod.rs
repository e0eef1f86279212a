//! Shared Memory Transport
//!
//! One fixed-size segment, reused for every batch, with exclusive access
//! passed back and forth through named semaphores.
//!
//! # Layout
//!
//! ```text
//! /shuttle_segment        [count: u32][batch payload ...]
//! /shuttle_p2c            parent -> worker: segment is yours
//! /shuttle_c2p            worker -> parent: segment is yours again
//! /shuttle_exit           parent -> worker: leave at the next turn
//! ```
//!
//! A matrix larger than the payload area travels in
//! `ceil(elements / capacity)` batches. Every name is unlinked before the
//! session starts (stale leftovers) and again when it ends.

mod handoff;
mod segment;
mod semaphore;
mod worker;

pub use handoff::batch_ranges;

use nix::unistd::Pid;

use super::config::SharedMemoryConfig;
use super::frame;
use super::process::{fork_worker, reap_worker};
use super::traits::{ensure_active, ensure_startable, SessionState, Transport, TransportError};
use crate::matrix::Matrix;
use handoff::{Handoff, Semaphores};
use segment::SharedObject;

const NAME: &str = "SharedMemory";

/// Shared-memory transport to a forked worker
pub struct SharedMemoryTransport {
    config: SharedMemoryConfig,
    state: SessionState,
    handoff: Option<Handoff>,
    worker: Option<Pid>,
    last_batch_count: usize,
}

impl SharedMemoryTransport {
    /// Create a transport with the given configuration
    #[must_use]
    pub fn new(config: SharedMemoryConfig) -> Self {
        Self {
            config,
            state: SessionState::Uninitialized,
            handoff: None,
            worker: None,
            last_batch_count: 0,
        }
    }

    /// Number of batches the most recent request needed
    #[must_use]
    pub fn last_batch_count(&self) -> usize {
        self.last_batch_count
    }

    /// Settings this transport was built with
    #[must_use]
    pub fn config(&self) -> &SharedMemoryConfig {
        &self.config
    }

    /// Create the segment and semaphores, then fork
    ///
    /// Both sides get their mapping and semaphore handles before the fork,
    /// so the child only ever waits, posts and touches memory.
    fn spawn(&self) -> Result<(Pid, Handoff), TransportError> {
        let object = SharedObject::create(&self.config.segment_name, self.config.segment_size)?;
        let parent_sems = Semaphores::create(&self.config)?;
        let child_sems = Semaphores::open(&self.config)?;

        let child = Handoff::new(object.try_clone()?.map()?, child_sems);
        let parent = Handoff::new(object.map()?, parent_sems);

        let (pid, ()) = fork_worker("shared_memory", (), move || worker::run(child))?;
        Ok((pid, parent))
    }

    /// Remove every IPC name this session uses
    fn unlink_names(&self) -> Result<(), TransportError> {
        SharedObject::unlink(&self.config.segment_name)?;
        Semaphores::unlink(&self.config)
    }
}

impl Default for SharedMemoryTransport {
    fn default() -> Self {
        Self::new(SharedMemoryConfig::default())
    }
}

impl Transport for SharedMemoryTransport {
    fn start_session(&mut self) -> Result<(), TransportError> {
        ensure_startable(NAME, self.state)?;

        let capacity = self.config.batch_capacity();
        if capacity == 0 {
            return Err(TransportError::InvalidState(format!(
                "Segment of {} bytes has no room for elements",
                self.config.segment_size
            )));
        }

        let (pid, handoff) = match self.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                if let Err(cleanup) = self.unlink_names() {
                    tracing::warn!(transport = NAME, error = %cleanup, "Failed to unlink IPC names");
                }
                return Err(e);
            }
        };

        self.handoff = Some(handoff);
        self.worker = Some(pid);
        self.state = SessionState::Active;

        tracing::info!(
            transport = NAME,
            pid = pid.as_raw(),
            segment = %self.config.segment_name,
            capacity,
            "Session started"
        );
        Ok(())
    }

    fn request(&mut self, matrix: &Matrix) -> Result<Matrix, TransportError> {
        ensure_active(NAME, self.state)?;
        let handoff = self
            .handoff
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("Shared segment missing".into()))?;

        frame::check_edge(matrix.edge())?;
        let total = matrix.len();
        let count = u32::try_from(total).map_err(|_| {
            TransportError::Protocol(format!("{total} elements do not fit the segment header"))
        })?;

        let mut reply = Matrix::zeros(matrix.edge());
        handoff.send_count(count)?;

        let mut batches = 0;
        for range in batch_ranges(total, handoff.capacity()) {
            handoff.hand_off_and_wait_for_reply(
                &matrix.as_slice()[range.clone()],
                &mut reply.as_mut_slice()[range],
            )?;
            batches += 1;
        }
        self.last_batch_count = batches;

        tracing::debug!(transport = NAME, edge = matrix.edge(), batches, "Request complete");
        Ok(reply)
    }

    fn end_session(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Active {
            self.state = SessionState::Terminated;
            return Ok(());
        }
        self.state = SessionState::Terminated;

        if let Some(handoff) = self.handoff.as_ref() {
            if let Err(e) = handoff.request_exit() {
                tracing::warn!(transport = NAME, error = %e, "Failed to signal exit");
            }
        }

        let reaped = match self.worker.take() {
            Some(pid) => reap_worker("shared_memory", pid),
            None => Ok(()),
        };

        // Unmap and close before the names go away
        self.handoff = None;
        let unlinked = self.unlink_names();

        tracing::info!(transport = NAME, "Session ended");
        reaped.and(unlinked)
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

impl Drop for SharedMemoryTransport {
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
    use crate::transport::config::SEGMENT_HEADER_SIZE;

    fn transport_with_segment(segment_size: usize) -> SharedMemoryTransport {
        SharedMemoryTransport::new(SharedMemoryConfig::unique().with_segment_size(segment_size))
    }

    #[test]
    fn test_request_before_start_is_invalid() {
        let mut transport = transport_with_segment(1024);
        let result = transport.request(&Matrix::zeros(2));
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }

    #[test]
    fn test_header_only_segment_refused() {
        let mut transport = transport_with_segment(SEGMENT_HEADER_SIZE);
        assert!(matches!(
            transport.start_session(),
            Err(TransportError::InvalidState(_))
        ));
        assert_eq!(transport.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_small_segment_needs_three_batches() {
        // 100 elements per batch, 256 elements per matrix
        let mut transport = transport_with_segment(SEGMENT_HEADER_SIZE + 100 * 4);
        transport.start_session().unwrap();

        let m = Matrix::from_vec(16, (0..256).map(|i| i as f32 / 256.0).collect()).unwrap();
        let reply = transport.request(&m).unwrap();
        assert_eq!(transport.last_batch_count(), 3);
        assert!(payload::approximately_equal(&reply, &payload::transform(&m)));

        let small = Matrix::from_vec(5, vec![0.5; 25]).unwrap();
        transport.request(&small).unwrap();
        assert_eq!(transport.last_batch_count(), 1);

        transport.end_session().unwrap();
    }

    #[test]
    fn test_single_element_batches() {
        let mut transport = transport_with_segment(SEGMENT_HEADER_SIZE + 4);
        transport.start_session().unwrap();

        let m = payload::generate_seeded(4, 4);
        let reply = transport.request(&m).unwrap();
        assert_eq!(transport.last_batch_count(), 16);
        assert!(payload::approximately_equal(&reply, &payload::transform(&m)));

        transport.end_session().unwrap();
    }

    #[test]
    fn test_names_unlinked_after_end() {
        let mut transport = transport_with_segment(1024);
        transport.start_session().unwrap();
        transport.request(&payload::generate_seeded(3, 3)).unwrap();
        transport.end_session().unwrap();

        assert!(semaphore::NamedSemaphore::open(&transport.config().exit_name()).is_err());
        assert!(semaphore::NamedSemaphore::open(&transport.config().parent_to_child_name()).is_err());
    }

    #[test]
    fn test_stale_names_do_not_block_start() {
        let config = SharedMemoryConfig::unique().with_segment_size(256);
        let stale = semaphore::NamedSemaphore::create(&config.exit_name()).unwrap();
        stale.post().unwrap();
        drop(stale);

        let mut transport = SharedMemoryTransport::new(config);
        transport.start_session().unwrap();
        let m = payload::generate_seeded(2, 2);
        let reply = transport.request(&m).unwrap();
        assert!(payload::approximately_equal(&reply, &payload::transform(&m)));
        transport.end_session().unwrap();
    }
}
