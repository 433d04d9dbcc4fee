use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Runtime metrics for a tee or a forkable family.
///
/// A lightweight, read-only view shared by every handle of one multiplexer.
/// Obtain a `Stats` handle via [`Tee::stats`](crate::Tee::stats) or
/// [`Fork::stats`](crate::Fork::stats). Values use relaxed atomics and are
/// intended for diagnostics; the handle itself is `Send` so it can be read
/// from a reporting thread while the multiplexer stays on its own thread.
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
#[derive(Debug, Clone)]
pub struct Stats {
    live_handles: Arc<AtomicU64>,
    buffered: Arc<AtomicU64>,
    peak_buffered: Arc<AtomicU64>,
}

impl Stats {
    // Create a new, empty stats instance.
    pub(crate) fn new() -> Self {
        Self {
            live_handles: Arc::new(AtomicU64::new(0)),
            buffered: Arc::new(AtomicU64::new(0)),
            peak_buffered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn increment(&self) {
        self.live_handles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.live_handles.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered(&self, buffered: usize) {
        let buffered = buffered as u64;
        self.buffered.store(buffered, Ordering::Relaxed);
        self.peak_buffered.fetch_max(buffered, Ordering::Relaxed);
    }

    /// Returns the number of consumers or forks that are still alive.
    pub fn live_handles(&self) -> u64 {
        self.live_handles.load(Ordering::Relaxed)
    }

    /// Returns the number of values currently held in buffers.
    ///
    /// For a tee this is the shared buffer length; for forks it is the sum of
    /// every private buffer.
    pub fn buffered(&self) -> u64 {
        self.buffered.load(Ordering::Relaxed)
    }

    /// Returns the highest value [`buffered`](Self::buffered) has reached.
    pub fn peak_buffered(&self) -> u64 {
        self.peak_buffered.load(Ordering::Relaxed)
    }
}
