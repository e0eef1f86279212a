//! Shared Memory Worker
//!
//! Batch loop run inside the forked worker process.

use super::handoff::{batch_ranges, Handoff, Turn};
use crate::payload;
use crate::transport::TransportError;

/// Serve requests until the parent signals exit
pub(crate) fn run(mut handoff: Handoff) -> Result<(), TransportError> {
    let mut requests = 0u64;

    loop {
        let Some(total) = handoff.receive_count()? else {
            tracing::debug!(requests, "Shared memory worker exiting");
            return Ok(());
        };

        for range in batch_ranges(total, handoff.capacity()) {
            let turn = handoff.receive_and_respond(range.len(), payload::transform_in_place)?;
            if turn == Turn::Exit {
                tracing::debug!(requests, "Shared memory worker exiting mid-request");
                return Ok(());
            }
        }

        requests += 1;
        tracing::trace!(total, "Shared memory worker replied");
    }
}
