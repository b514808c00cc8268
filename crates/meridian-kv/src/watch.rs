// SPDX-License-Identifier: Apache-2.0
//! Prefix watches: push-based callbacks with explicit cancellation.
//!
//! Each watch owns a dedicated dispatcher thread fed by a channel. Events
//! for one key are enqueued under the backend's write lock, so per-key
//! order is exactly mutation order; nothing is guaranteed across keys.
//! Cancellation is cooperative: the handle flips a flag and the dispatcher
//! notices within its poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use meridian_core::PlaneError;

use crate::entry::KvEntry;

/// How often a dispatcher wakes to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receiver side of a prefix watch.
///
/// Callbacks run on the watch's dispatcher thread, one thread per watched
/// prefix; a slow handler delays only its own watch.
pub trait WatchHandler: Send + Sync {
    /// A key under the prefix was created or updated.
    fn on_put(&self, entry: KvEntry);
    /// A key under the prefix was deleted; `version` is the index of the
    /// deleting write.
    fn on_delete(&self, key: &str, version: u64);
    /// The watch itself failed; no further events will arrive.
    fn on_error(&self, error: PlaneError);
}

/// One event travelling from backend to dispatcher.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// Create or update.
    Put(KvEntry),
    /// Deletion, with the index of the deleting write.
    Delete(String, u64),
    /// Terminal failure.
    Error(PlaneError),
}

/// Cancellation handle for a running watch.
///
/// Dropping the handle without calling [`cancel`](Self::cancel) leaves the
/// watch running for the life of the backend.
#[derive(Debug)]
pub struct WatchHandle {
    cancelled: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the watch and join its dispatcher thread.
    pub fn cancel(mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }

    /// Whether the watch has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Subscription {
    prefix: String,
    sender: Sender<WatchEvent>,
    cancelled: Arc<AtomicBool>,
}

/// Fan-out registry shared by the in-memory backends.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    subs: Mutex<Vec<Subscription>>,
}

impl WatchRegistry {
    /// Register a watch and spawn its dispatcher.
    pub(crate) fn subscribe(&self, prefix: &str, handler: Arc<dyn WatchHandler>) -> WatchHandle {
        let (sender, receiver) = std::sync::mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let dispatcher = spawn_dispatcher(receiver, handler, Arc::clone(&cancelled));
        if let Ok(mut subs) = self.subs.lock() {
            subs.push(Subscription {
                prefix: prefix.to_owned(),
                sender,
                cancelled: Arc::clone(&cancelled),
            });
        }
        WatchHandle { cancelled, dispatcher: Some(dispatcher) }
    }

    /// Publish an event to every live watch whose prefix covers `key`.
    ///
    /// Called under the backend's write lock, which is what makes per-key
    /// delivery order equal mutation order.
    pub(crate) fn publish(&self, key: &str, event: &WatchEvent) {
        let Ok(mut subs) = self.subs.lock() else {
            return;
        };
        subs.retain(|sub| {
            if sub.cancelled.load(Ordering::Acquire) {
                return false;
            }
            if !crate::tree::Tree::in_subtree(&sub.prefix, key) {
                return true;
            }
            // A closed channel means the dispatcher died; drop the sub.
            sub.sender.send(event.clone()).is_ok()
        });
    }
}

fn spawn_dispatcher(
    receiver: Receiver<WatchEvent>,
    handler: Arc<dyn WatchHandler>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || loop {
        if cancelled.load(Ordering::Acquire) {
            return;
        }
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(WatchEvent::Put(entry)) => handler.on_put(entry),
            Ok(WatchEvent::Delete(key, version)) => handler.on_delete(&key, version),
            Ok(WatchEvent::Error(error)) => {
                handler.on_error(error);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
