// SPDX-License-Identifier: Apache-2.0
//! The bounded submission queue.

use tokio::sync::mpsc;

use meridian_core::{Heartbeat, PlaneError, PlaneResult};

/// Producer side of the ingestion queue.
///
/// The queue is bounded; when it is full, [`submit`](Self::submit) fails
/// with `Overloaded` and the transport adapter must surface that to the
/// producer. Silent dropping is forbidden — an instance that cannot
/// report must know it could not report.
#[derive(Clone)]
pub struct HeartbeatQueue {
    sender: mpsc::Sender<Heartbeat>,
}

impl HeartbeatQueue {
    /// Create a queue of the given capacity, returning the consumer end
    /// for the batch loop.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Heartbeat>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue one heartbeat without waiting.
    ///
    /// # Errors
    ///
    /// `Overloaded` when the queue is full; `BackendUnavailable` when the
    /// pipeline has shut down.
    pub fn submit(&self, heartbeat: Heartbeat) -> PlaneResult<()> {
        const OP: &str = "heartbeat.submit";
        match self.sender.try_send(heartbeat) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PlaneError::overloaded(OP, "heartbeat queue is full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PlaneError::backend_unavailable(OP, "heartbeat pipeline is shut down"))
            }
        }
    }
}
