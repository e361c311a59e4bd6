//! Bounded hand-off from background threads to the dispatch thread.
//!
//! Producers push items from any thread; each push also bumps an eventfd so
//! the host's poll loop wakes up. The dispatch thread clears the descriptor
//! and drains the queue from a unit's `try_produce_frame`.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default hand-off queue depth.
pub const DEFAULT_HANDOFF_CAPACITY: usize = 16;

struct Shared {
    wake: EventFd,
    dropped: AtomicU64,
}

/// Receiving end, owned by the unit on the dispatch thread.
pub struct HandOff<T> {
    rx: Receiver<T>,
    tx: Sender<T>,
    shared: Arc<Shared>,
}

/// Sending end. Cheap to clone and safe to move to other threads.
pub struct HandOffSender<T> {
    tx: Sender<T>,
    shared: Arc<Shared>,
}

impl<T> Clone for HandOffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> HandOff<T> {
    pub fn new(capacity: usize) -> io::Result<Self> {
        let wake = EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)
            .map_err(io::Error::from)?;
        let (tx, rx) = bounded(capacity.max(1));
        Ok(Self {
            rx,
            tx,
            shared: Arc::new(Shared {
                wake,
                dropped: AtomicU64::new(0),
            }),
        })
    }

    pub fn sender(&self) -> HandOffSender<T> {
        HandOffSender {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Descriptor that becomes readable when items are waiting.
    pub fn fileno(&self) -> RawFd {
        self.shared.wake.as_raw_fd()
    }

    /// Reset the wake descriptor and take everything queued so far.
    pub fn drain(&self) -> Vec<T> {
        self.clear_wake();
        self.rx.try_iter().collect()
    }

    /// Reset the wake descriptor and take one item. Callers loop until `None`.
    pub fn try_pop(&self) -> Option<T> {
        self.clear_wake();
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Items refused because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn clear_wake(&self) {
        match self.shared.wake.read() {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(e) => tracing::warn!("Failed to reset hand-off wake descriptor: {}", e),
        }
    }
}

impl<T> HandOffSender<T> {
    /// Queue `item` without blocking. A full queue drops the new item.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => {
                if let Err(e) = self.shared.wake.write(1) {
                    tracing::warn!("Failed to signal hand-off wake descriptor: {}", e);
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("Hand-off queue full, dropping newest item ({} dropped so far)", total);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
