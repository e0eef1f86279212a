//! Alternating-Turn Handoff
//!
//! Owns the mapped segment and the three semaphores. Whoever holds the turn
//! is the only side touching the segment:
//!
//! ```text
//!   Parent                                Worker
//!   ──────                                ──────
//!   write count ─► post p2c ───────────►  wait p2c, check exit
//!                                         read count
//!   wait c2p  ◄──────────────────────────  post c2p
//!   ┌ for each batch ───────────────────────────────────────┐
//!   │ copy batch in ─► post p2c ───────►  wait p2c, check exit│
//!   │                                     transform in place  │
//!   │ wait c2p ◄─────────────────────────  post c2p           │
//!   │ copy batch out                                          │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown posts `exit` then `p2c`, so a worker parked on `p2c` wakes,
//! sees `exit` and leaves.

use std::ops::Range;

use super::segment::Segment;
use super::semaphore::NamedSemaphore;
use crate::transport::config::SharedMemoryConfig;
use crate::transport::TransportError;

/// What the worker found when its turn came
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Turn {
    /// Keep going
    Proceed,
    /// The parent asked for shutdown
    Exit,
}

/// The three semaphores of one session
pub(crate) struct Semaphores {
    parent_to_child: NamedSemaphore,
    child_to_parent: NamedSemaphore,
    exit: NamedSemaphore,
}

impl Semaphores {
    /// Create all three fresh, replacing stale instances
    pub(crate) fn create(config: &SharedMemoryConfig) -> Result<Self, TransportError> {
        Ok(Self {
            parent_to_child: NamedSemaphore::create(&config.parent_to_child_name())?,
            child_to_parent: NamedSemaphore::create(&config.child_to_parent_name())?,
            exit: NamedSemaphore::create(&config.exit_name())?,
        })
    }

    /// Open all three by name
    pub(crate) fn open(config: &SharedMemoryConfig) -> Result<Self, TransportError> {
        Ok(Self {
            parent_to_child: NamedSemaphore::open(&config.parent_to_child_name())?,
            child_to_parent: NamedSemaphore::open(&config.child_to_parent_name())?,
            exit: NamedSemaphore::open(&config.exit_name())?,
        })
    }

    /// Remove all three names
    pub(crate) fn unlink(config: &SharedMemoryConfig) -> Result<(), TransportError> {
        NamedSemaphore::unlink(&config.parent_to_child_name())?;
        NamedSemaphore::unlink(&config.child_to_parent_name())?;
        NamedSemaphore::unlink(&config.exit_name())?;
        Ok(())
    }
}

/// Exclusive-turn access to the shared segment
pub(crate) struct Handoff {
    segment: Segment,
    sems: Semaphores,
}

impl Handoff {
    pub(crate) fn new(segment: Segment, sems: Semaphores) -> Self {
        Self { segment, sems }
    }

    /// Elements per batch
    pub(crate) fn capacity(&self) -> usize {
        self.segment.capacity()
    }

    // -------------------------------------------------------------------------
    // Parent side
    // -------------------------------------------------------------------------

    /// Publish the element count and wait for the worker to take it
    pub(crate) fn send_count(&mut self, count: u32) -> Result<(), TransportError> {
        self.segment.set_header(count);
        self.sems.parent_to_child.post()?;
        self.sems.child_to_parent.wait()
    }

    /// Copy `batch` in, let the worker transform it, copy the result to `reply`
    pub(crate) fn hand_off_and_wait_for_reply(
        &mut self,
        batch: &[f32],
        reply: &mut [f32],
    ) -> Result<(), TransportError> {
        let n = batch.len();
        if n > self.capacity() || reply.len() != n {
            return Err(TransportError::Protocol(format!(
                "batch of {n} elements (reply {}) does not fit capacity {}",
                reply.len(),
                self.capacity()
            )));
        }

        self.segment.payload_mut()[..n].copy_from_slice(batch);
        self.sems.parent_to_child.post()?;
        self.sems.child_to_parent.wait()?;
        reply.copy_from_slice(&self.segment.payload()[..n]);
        Ok(())
    }

    /// Ask the worker to exit, waking it if it is parked
    pub(crate) fn request_exit(&self) -> Result<(), TransportError> {
        self.sems.exit.post()?;
        self.sems.parent_to_child.post()
    }

    // -------------------------------------------------------------------------
    // Worker side
    // -------------------------------------------------------------------------

    /// Wait for the parent's turn to pass to us, then check for shutdown
    pub(crate) fn wait_for_turn(&self) -> Result<Turn, TransportError> {
        self.sems.parent_to_child.wait()?;
        if self.sems.exit.try_wait()? {
            return Ok(Turn::Exit);
        }
        Ok(Turn::Proceed)
    }

    /// Take the element count published by the parent and acknowledge it
    ///
    /// Returns `None` on shutdown.
    pub(crate) fn receive_count(&self) -> Result<Option<usize>, TransportError> {
        if self.wait_for_turn()? == Turn::Exit {
            return Ok(None);
        }
        let count = self.segment.header() as usize;
        self.sems.child_to_parent.post()?;
        Ok(Some(count))
    }

    /// Wait for a batch of `n` elements, apply `respond` in place, hand it back
    pub(crate) fn receive_and_respond<F>(&mut self, n: usize, respond: F) -> Result<Turn, TransportError>
    where
        F: FnOnce(&mut [f32]),
    {
        if self.wait_for_turn()? == Turn::Exit {
            return Ok(Turn::Exit);
        }
        let n = n.min(self.capacity());
        respond(&mut self.segment.payload_mut()[..n]);
        self.sems.child_to_parent.post()?;
        Ok(Turn::Proceed)
    }
}

/// Split `total` elements into consecutive batches of at most `capacity`
///
/// Yields exactly `ceil(total / capacity)` ranges.
pub fn batch_ranges(total: usize, capacity: usize) -> impl Iterator<Item = Range<usize>> {
    let capacity = capacity.max(1);
    (0..total)
        .step_by(capacity)
        .map(move |start| start..(start + capacity).min(total))
}
