//! Eager replication of one source into N buffer-synchronized consumers.
//!
//! All consumers of a tee share a single FIFO buffer. Each consumer owns only
//! an offset into it; after every read the entries that every live consumer
//! has already seen are dropped from the front. Memory therefore grows with
//! the distance between the fastest and the slowest consumer, not with the
//! length of the source.

use crate::cursor::Cursor;
use futures_util::stream::{FusedStream, Stream};
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use tracing::trace;

new_key_type! {
    struct ConsumerKey;
}

/// State shared by every consumer of one tee.
struct TeeState<S, T> {
    cursor: Cursor<S>,
    // Holds exactly the values between the slowest and the fastest consumer.
    buffer: VecDeque<T>,
    offsets: SlotMap<ConsumerKey, usize>,
    // Wakers of stream consumers waiting on a pending source.
    parked: Vec<Waker>,
    #[cfg(feature = "stats")]
    stats: crate::stats::Stats,
}

impl<S, T> TeeState<S, T> {
    fn new(cursor: Cursor<S>) -> Self {
        Self {
            cursor,
            buffer: VecDeque::new(),
            offsets: SlotMap::with_key(),
            parked: Vec::new(),
            #[cfg(feature = "stats")]
            stats: crate::stats::Stats::new(),
        }
    }

    fn register(&mut self, offset: usize) -> ConsumerKey {
        let key = self.offsets.insert(offset);
        #[cfg(feature = "stats")]
        self.stats.increment();
        trace!(offset, consumers = self.offsets.len(), "registered tee consumer");
        key
    }

    fn release(&mut self, key: ConsumerKey) {
        if self.offsets.remove(key).is_some() {
            #[cfg(feature = "stats")]
            self.stats.decrement();
            trace!(consumers = self.offsets.len(), "released tee consumer");
        }
        self.prune();
    }

    /// Number of buffered values the consumer has not read yet.
    fn ahead(&self, key: ConsumerKey) -> usize {
        self.buffer.len() - self.offsets[key]
    }

    /// Drops the entries every live consumer has read and rebases the offsets.
    fn prune(&mut self) {
        let min = self
            .offsets
            .values()
            .copied()
            .min()
            .unwrap_or(self.buffer.len());

        if min > 0 {
            self.buffer.drain(..min);
            for offset in self.offsets.values_mut() {
                *offset -= min;
            }
            trace!(pruned = min, buffered = self.buffer.len(), "pruned tee buffer");
        }

        #[cfg(feature = "stats")]
        self.stats.record_buffered(self.buffer.len());
    }

    fn park(&mut self, waker: &Waker) {
        if !self.parked.iter().any(|parked| parked.will_wake(waker)) {
            self.parked.push(waker.clone());
        }
    }

    fn unpark(&mut self) -> Vec<Waker> {
        mem::take(&mut self.parked)
    }
}

impl<S, T> TeeState<S, T>
where
    T: Clone,
{
    /// Reads the consumer's next value from the buffer, if it has one.
    fn take_buffered(&mut self, key: ConsumerKey) -> Option<T> {
        let offset = self.offsets[key];
        let value = self.buffer.get(offset)?.clone();
        self.offsets[key] = offset + 1;
        self.prune();
        Some(value)
    }

    /// Records a value the consumer just pulled from the source.
    fn accept(&mut self, key: ConsumerKey, value: T) -> T {
        // The puller sits at the end of the buffer, so every other live
        // consumer is at or behind it and still needs this value.
        if self.offsets.len() > 1 {
            self.buffer.push_back(value.clone());
            self.offsets[key] = self.buffer.len();
            trace!(buffered = self.buffer.len(), "tee pulled from source");
            #[cfg(feature = "stats")]
            self.stats.record_buffered(self.buffer.len());
        }
        value
    }
}

/// One consumer of a tee.
///
/// A `Tee` is an [`Iterator`] when its source is an iterator and a [`Stream`]
/// when its source is a stream. Reading a consumer never forces the others to
/// advance; a consumer that still has buffered values never touches the
/// source.
///
/// Cloning a consumer registers a new consumer at the same position. Dropping
/// a consumer unregisters it, so an abandoned consumer does not hold values in
/// the shared buffer.
///
/// # Examples
///
/// ```
/// use seqplex::tee;
///
/// let mut copies = tee(vec![1, 2, 3], 2);
/// let second = copies.pop().unwrap();
/// let first = copies.pop().unwrap();
///
/// assert_eq!(first.collect::<Vec<_>>(), vec![1, 2, 3]);
/// assert_eq!(second.collect::<Vec<_>>(), vec![1, 2, 3]);
/// ```
///
/// Stream sources are supported through [`tee_stream`]:
///
/// ```
/// use seqplex::tee_stream;
/// use futures_util::stream;
/// use futures_util::StreamExt;
///
/// # tokio_test::block_on(async {
/// let mut copies = tee_stream(stream::iter(vec!["a", "b"]), 2);
/// let second = copies.pop().unwrap();
/// let first = copies.pop().unwrap();
///
/// let (left, right) = futures_util::join!(
///     first.collect::<Vec<_>>(),
///     second.collect::<Vec<_>>()
/// );
/// assert_eq!(left, vec!["a", "b"]);
/// assert_eq!(right, vec!["a", "b"]);
/// # });
/// ```
pub struct Tee<S, T> {
    state: Rc<RefCell<TeeState<S, T>>>,
    key: ConsumerKey,
}

impl<S, T> Tee<S, T> {
    fn split(source: S, count: usize) -> Vec<Self> {
        trace!(count, "splitting source into tee consumers");
        let state = Rc::new(RefCell::new(TeeState::new(Cursor::new(source))));
        (0..count)
            .map(|_| {
                let key = state.borrow_mut().register(0);
                Tee {
                    state: Rc::clone(&state),
                    key,
                }
            })
            .collect()
    }

    /// Returns how many values are buffered ahead of this consumer.
    ///
    /// The slowest consumer sees the whole shared buffer; the fastest sees
    /// zero.
    pub fn backlog(&self) -> usize {
        self.state.borrow().ahead(self.key)
    }

    /// Returns the runtime metrics shared by every consumer of this tee.
    ///
    /// ```
    /// use seqplex::tee;
    ///
    /// let mut copies = tee(0..10, 2);
    /// let stats = copies[0].stats();
    /// assert_eq!(stats.live_handles(), 2);
    ///
    /// copies[0].nth(3);
    /// assert_eq!(stats.buffered(), 4);
    ///
    /// copies.truncate(1);
    /// assert_eq!(stats.live_handles(), 1);
    /// assert_eq!(stats.buffered(), 0);
    /// assert_eq!(stats.peak_buffered(), 4);
    /// ```
    #[cfg(feature = "stats")]
    #[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
    pub fn stats(&self) -> crate::stats::Stats {
        self.state.borrow().stats.clone()
    }
}

/// Returns `count` independent copies of `source`.
///
/// Values not yet read by every copy are kept in a shared buffer, so memory
/// use grows when only some copies are consumed. With `count == 0` the source
/// is dropped without being read.
///
/// ```
/// use seqplex::tee;
///
/// assert_eq!(tee(vec![1, 2], 3).len(), 3);
/// assert!(tee(vec![1, 2], 0).is_empty());
/// ```
pub fn tee<I>(source: I, count: usize) -> Vec<Tee<I::IntoIter, I::Item>>
where
    I: IntoIterator,
    I::Item: Clone,
{
    if count == 0 {
        return Vec::new();
    }
    Tee::split(source.into_iter(), count)
}

/// Returns `count` independent copies of a [`Stream`].
///
/// The stream counterpart of [`tee`]. Consumers may be polled from different
/// tasks of a single-threaded executor; a consumer waiting on the source is
/// woken as soon as any other consumer receives the next value.
pub fn tee_stream<S>(source: S, count: usize) -> Vec<Tee<S, S::Item>>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    if count == 0 {
        return Vec::new();
    }
    Tee::split(source, count)
}

impl<S, T> Clone for Tee<S, T> {
    fn clone(&self) -> Self {
        let mut state = self.state.borrow_mut();
        let offset = state.offsets[self.key];
        let key = state.register(offset);
        Self {
            state: Rc::clone(&self.state),
            key,
        }
    }
}

impl<S, T> Drop for Tee<S, T> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.release(self.key);
        // The source may hold the waker of this consumer only; hand the wake-up
        // over to whoever is still waiting.
        let parked = state.unpark();
        drop(state);
        parked.into_iter().for_each(Waker::wake);
    }
}

impl<S, T> fmt::Debug for Tee<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Tee");
        if let Ok(state) = self.state.try_borrow() {
            debug
                .field("buffered", &state.ahead(self.key))
                .field("consumers", &state.offsets.len())
                .field("terminated", &state.cursor.is_terminated());
        }
        debug.finish_non_exhaustive()
    }
}

impl<I> Iterator for Tee<I, I::Item>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.state.borrow_mut();
        if let Some(value) = state.take_buffered(self.key) {
            return Some(value);
        }

        let value = state.cursor.pull()?;
        Some(state.accept(self.key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let state = self.state.borrow();
        let ahead = state.ahead(self.key);
        let (lower, upper) = Iterator::size_hint(&state.cursor);
        (
            lower.saturating_add(ahead),
            upper.and_then(|upper| upper.checked_add(ahead)),
        )
    }
}

impl<I> FusedIterator for Tee<I, I::Item>
where
    I: Iterator,
    I::Item: Clone,
{
}

impl<S> Stream for Tee<S, S::Item>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        if let Some(value) = state.take_buffered(this.key) {
            return Poll::Ready(Some(value));
        }

        match state.cursor.poll_pull(cx) {
            Poll::Pending => {
                state.park(cx.waker());
                Poll::Pending
            }
            Poll::Ready(item) => {
                let item = item.map(|value| state.accept(this.key, value));
                let parked = state.unpark();
                drop(state);
                parked.into_iter().for_each(Waker::wake);
                Poll::Ready(item)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let state = self.state.borrow();
        let ahead = state.ahead(self.key);
        let (lower, upper) = Stream::size_hint(&state.cursor);
        (
            lower.saturating_add(ahead),
            upper.and_then(|upper| upper.checked_add(ahead)),
        )
    }
}

impl<S> FusedStream for Tee<S, S::Item>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    fn is_terminated(&self) -> bool {
        let state = self.state.borrow();
        state.cursor.is_terminated() && state.ahead(self.key) == 0
    }
}
