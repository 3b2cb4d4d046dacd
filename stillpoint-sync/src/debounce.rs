//! Coalescing sync trigger.
//!
//! Every sync-eligible local write schedules a fire a fixed delay in the
//! future; scheduling again inside the window resets the timer, so a burst
//! of writes produces exactly one fire. Fires land on a channel consumed
//! by the auto-sync runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use stillpoint_types::OwnerId;
use tokio::sync::mpsc;
use tracing::debug;

/// Cancellable, coalescing timer.
///
/// A generation counter invalidates superseded timers: each `schedule`
/// bumps the generation and spawns a sleeper; only the sleeper that still
/// holds the current generation when it wakes actually fires.
pub struct DebouncedTrigger {
    delay: Duration,
    generation: Arc<AtomicU64>,
    fire_tx: mpsc::Sender<OwnerId>,
}

impl DebouncedTrigger {
    /// Creates a trigger and the receiving end of its fire channel.
    pub fn new(delay: Duration) -> (Self, mpsc::Receiver<OwnerId>) {
        let (fire_tx, fire_rx) = mpsc::channel(16);
        (
            Self {
                delay,
                generation: Arc::new(AtomicU64::new(0)),
                fire_tx,
            },
            fire_rx,
        )
    }

    /// Schedules a fire for `owner`, resetting any pending one.
    ///
    /// Outside a tokio runtime this is a no-op: debouncing is an
    /// efficiency property and callers can always sync manually.
    pub fn schedule(&self, owner: OwnerId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, skipping debounced sync for {owner}");
            return;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let fire_tx = self.fire_tx.clone();
        let delay = self.delay;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                let _ = fire_tx.try_send(owner);
            }
        });
    }

    /// Cancels any pending fire.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
