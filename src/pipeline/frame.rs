//! Reference-counted frame buffers.
//!
//! A [`FrameBuffer`] is immutable once built: producers fill a
//! [`FrameBufferBuilder`] and freeze it. Cloning a buffer retains it and
//! dropping a clone releases it; the payload is freed (or handed back to
//! its [`FramePool`]) when the last holder lets go.
//!
//! # Example
//!
//! ```
//! use framechain::pipeline::FrameBuffer;
//!
//! let mut builder = FrameBuffer::builder(640 * 480);
//! builder.data_mut().fill(0x80);
//! let frame = builder.timestamp(1_000).freeze().unwrap();
//!
//! let downstream = frame.clone();
//! assert_eq!(frame.ref_count(), 2);
//! drop(downstream);
//! assert_eq!(frame.ref_count(), 1);
//! ```

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Default number of spare payloads a pool keeps around.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bytes used ({used}) exceeds allocated length ({length})")]
    UsedExceedsLength { used: usize, length: usize },
}

struct FrameInner {
    data: Vec<u8>,
    bytes_used: usize,
    timestamp: i64,
    source_uid: u64,
    metadata: BTreeMap<String, Bytes>,
    recycler: Option<Recycler>,
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler.give_back(std::mem::take(&mut self.data));
        }
    }
}

/// One frame of pixel data plus timing, provenance and metadata.
#[derive(Clone)]
pub struct FrameBuffer {
    inner: Arc<FrameInner>,
}

impl FrameBuffer {
    /// Start building a frame with `length` zeroed bytes of storage.
    pub fn builder(length: usize) -> FrameBufferBuilder {
        FrameBufferBuilder::from_storage(vec![0; length], None)
    }

    /// Wrap an existing payload. All bytes count as used.
    pub fn from_vec(data: Vec<u8>, timestamp: i64) -> Self {
        let bytes_used = data.len();
        Self {
            inner: Arc::new(FrameInner {
                data,
                bytes_used,
                timestamp,
                source_uid: 0,
                metadata: BTreeMap::new(),
                recycler: None,
            }),
        }
    }

    /// The used part of the payload.
    pub fn data(&self) -> &[u8] {
        &self.inner.data[..self.inner.bytes_used]
    }

    /// Allocated payload length.
    pub fn length(&self) -> usize {
        self.inner.data.len()
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.bytes_used
    }

    /// Capture time in microseconds.
    pub fn timestamp(&self) -> i64 {
        self.inner.timestamp
    }

    pub fn source_uid(&self) -> u64 {
        self.inner.source_uid
    }

    pub fn metadata(&self) -> &BTreeMap<String, Bytes> {
        &self.inner.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Bytes> {
        self.inner.metadata.get(key)
    }

    /// Number of live holders of this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &FrameBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("length", &self.length())
            .field("bytes_used", &self.bytes_used())
            .field("timestamp", &self.timestamp())
            .field("source_uid", &self.source_uid())
            .field("metadata_keys", &self.inner.metadata.len())
            .finish()
    }
}

/// Mutable stage of a frame's life, before it is shared.
pub struct FrameBufferBuilder {
    data: Vec<u8>,
    bytes_used: usize,
    timestamp: i64,
    source_uid: u64,
    metadata: BTreeMap<String, Bytes>,
    recycler: Option<Recycler>,
}

impl FrameBufferBuilder {
    fn from_storage(data: Vec<u8>, recycler: Option<Recycler>) -> Self {
        Self {
            bytes_used: data.len(),
            data,
            timestamp: 0,
            source_uid: 0,
            metadata: BTreeMap::new(),
            recycler,
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn bytes_used(mut self, used: usize) -> Self {
        self.bytes_used = used;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn source_uid(mut self, uid: u64) -> Self {
        self.source_uid = uid;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finish the frame. Fails if more bytes are marked used than allocated.
    pub fn freeze(mut self) -> Result<FrameBuffer, FrameError> {
        if self.bytes_used > self.data.len() {
            return Err(FrameError::UsedExceedsLength {
                used: self.bytes_used,
                length: self.data.len(),
            });
        }
        Ok(FrameBuffer {
            inner: Arc::new(FrameInner {
                data: std::mem::take(&mut self.data),
                bytes_used: self.bytes_used,
                timestamp: self.timestamp,
                source_uid: self.source_uid,
                metadata: std::mem::take(&mut self.metadata),
                recycler: self.recycler.take(),
            }),
        })
    }
}

impl Drop for FrameBufferBuilder {
    fn drop(&mut self) {
        // Abandoned builders still hand their storage back.
        if let Some(recycler) = self.recycler.take() {
            recycler.give_back(std::mem::take(&mut self.data));
        }
    }
}

#[derive(Default)]
struct PoolCounters {
    allocated: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
}

#[derive(Clone)]
struct Recycler {
    spares: Sender<Vec<u8>>,
    counters: Arc<PoolCounters>,
}

impl Recycler {
    fn give_back(&self, storage: Vec<u8>) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        // A full spare list frees the storage instead.
        let _ = self.spares.try_send(storage);
    }
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Payloads allocated fresh.
    pub allocated: u64,
    /// Payloads served from recycled storage.
    pub reused: u64,
    /// Buffers whose storage came back to the pool.
    pub released: u64,
}

impl PoolStats {
    /// Buffers handed out and not yet released.
    pub fn outstanding(&self) -> u64 {
        (self.allocated + self.reused).saturating_sub(self.released)
    }
}

/// Recycles payload allocations between frames of similar size.
pub struct FramePool {
    spares_tx: Sender<Vec<u8>>,
    spares_rx: Receiver<Vec<u8>>,
    counters: Arc<PoolCounters>,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        let (spares_tx, spares_rx) = bounded(capacity.max(1));
        Self {
            spares_tx,
            spares_rx,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Hand out zeroed storage of `length` bytes, reusing a spare when one fits.
    pub fn acquire(&self, length: usize) -> FrameBufferBuilder {
        let storage = match self.spares_rx.try_recv() {
            Ok(mut spare) if spare.capacity() >= length => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                spare.clear();
                spare.resize(length, 0);
                spare
            }
            _ => {
                self.counters.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0; length]
            }
        };
        let recycler = Recycler {
            spares: self.spares_tx.clone(),
            counters: Arc::clone(&self.counters),
        };
        FrameBufferBuilder::from_storage(storage, Some(recycler))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
        }
    }

    /// Number of spare payloads currently held.
    pub fn spare_count(&self) -> usize {
        self.spares_rx.len()
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
