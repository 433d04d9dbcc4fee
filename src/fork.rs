//! Fork-on-demand replication with automatic reclamation.
//!
//! A forkable source starts out as a single root [`Fork`]. New forks can be
//! spawned from any fork at any time; each one continues from exactly the
//! point its target had reached and is independent from then on.
//!
//! Every fork keeps a private buffer in an arena owned by the shared state.
//! The arena is keyed by generation-tagged indices and only the [`Fork`]
//! handle holds its key, so the broadcast registry never keeps a fork alive:
//! dropping the handle removes its slot and it stops receiving values.

use crate::cursor::Cursor;
use crate::error::{Error, Result};
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
    struct ForkKey;
}

/// State shared by every fork spawned from one source.
struct ForkState<S, T> {
    cursor: Cursor<S>,
    forks: SlotMap<ForkKey, VecDeque<T>>,
    parked: Vec<Waker>,
    #[cfg(feature = "stats")]
    stats: crate::stats::Stats,
}

impl<S, T> ForkState<S, T> {
    fn new(cursor: Cursor<S>) -> Self {
        Self {
            cursor,
            forks: SlotMap::with_key(),
            parked: Vec::new(),
            #[cfg(feature = "stats")]
            stats: crate::stats::Stats::new(),
        }
    }

    fn register(&mut self, buffer: VecDeque<T>) -> ForkKey {
        let buffered = buffer.len();
        let key = self.forks.insert(buffer);
        #[cfg(feature = "stats")]
        {
            self.stats.increment();
            self.record_buffered();
        }
        trace!(buffered, forks = self.forks.len(), "registered fork");
        key
    }

    fn reclaim(&mut self, key: ForkKey) {
        if let Some(buffer) = self.forks.remove(key) {
            #[cfg(feature = "stats")]
            {
                self.stats.decrement();
                self.record_buffered();
            }
            trace!(
                dropped = buffer.len(),
                forks = self.forks.len(),
                "reclaimed fork"
            );
        }
    }

    fn take_buffered(&mut self, key: ForkKey) -> Option<T> {
        let value = self.forks[key].pop_front();
        #[cfg(feature = "stats")]
        if value.is_some() {
            self.record_buffered();
        }
        value
    }

    #[cfg(feature = "stats")]
    fn record_buffered(&self) {
        let buffered = self.forks.values().map(VecDeque::len).sum();
        self.stats.record_buffered(buffered);
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

impl<S, T> ForkState<S, T>
where
    T: Clone,
{
    /// Delivers a freshly pulled value to every other registered fork and
    /// hands it back to the reader, whose own buffer is empty.
    fn broadcast(&mut self, reader: ForkKey, value: T) -> T {
        for (key, buffer) in self.forks.iter_mut() {
            if key != reader {
                buffer.push_back(value.clone());
            }
        }
        trace!(forks = self.forks.len(), "broadcast pulled value");
        #[cfg(feature = "stats")]
        self.record_buffered();
        value
    }
}

/// A replication point over a shared source.
///
/// A `Fork` is an [`Iterator`] when its source is an iterator and a [`Stream`]
/// when its source is a stream. Reading a fork first drains its private
/// buffer; once that is empty the next value is pulled from the shared source
/// and delivered to every fork that is still alive.
///
/// [`Fork::fork`] (and [`Clone`]) creates a new fork that continues from the
/// current position; its buffer is a copy of the target's, not a shared view.
///
/// A fork that is not read keeps every value pulled since it fell behind, so
/// drop forks you no longer need.
///
/// # Examples
///
/// ```
/// use seqplex::{fork, make_forkable};
///
/// let mut root = make_forkable(vec![1, 2, 3, 4, 5]);
/// assert_eq!(root.next(), Some(1));
/// assert_eq!(root.next(), Some(2));
///
/// let mut first = fork(&root);
/// let second = fork(&root);
/// assert_eq!(first.next(), Some(3));
///
/// let third = fork(&first);
/// assert_eq!(first.collect::<Vec<_>>(), vec![4, 5]);
/// assert_eq!(second.collect::<Vec<_>>(), vec![3, 4, 5]);
/// assert_eq!(third.collect::<Vec<_>>(), vec![4, 5]);
/// assert_eq!(root.collect::<Vec<_>>(), vec![3, 4, 5]);
/// ```
pub struct Fork<S, T> {
    state: Rc<RefCell<ForkState<S, T>>>,
    key: ForkKey,
}

impl<S, T> Fork<S, T> {
    /// Makes `source` forkable, returning the root fork.
    ///
    /// The root owns the only cursor into the source; reading the source by
    /// any other means would hide values from the forks.
    pub fn new(source: S) -> Self {
        let mut state = ForkState::new(Cursor::new(source));
        let key = state.register(VecDeque::new());
        Self {
            state: Rc::new(RefCell::new(state)),
            key,
        }
    }

    /// Returns the number of values waiting in this fork's private buffer.
    pub fn backlog(&self) -> usize {
        self.state.borrow().forks[self.key].len()
    }

    /// Returns how many forks of this source are still alive.
    pub fn live_forks(&self) -> usize {
        self.state.borrow().forks.len()
    }

    /// Returns the runtime metrics shared by every fork of this source.
    ///
    /// ```
    /// use seqplex::make_forkable;
    ///
    /// let mut root = make_forkable(0..10);
    /// let stats = root.stats();
    /// let lagging = root.fork();
    /// assert_eq!(stats.live_handles(), 2);
    ///
    /// root.nth(2);
    /// assert_eq!(stats.buffered(), 3);
    ///
    /// drop(lagging);
    /// assert_eq!(stats.live_handles(), 1);
    /// assert_eq!(stats.buffered(), 0);
    /// ```
    #[cfg(feature = "stats")]
    #[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
    pub fn stats(&self) -> crate::stats::Stats {
        self.state.borrow().stats.clone()
    }
}

impl<S, T> Fork<S, T>
where
    T: Clone,
{
    /// Creates a fork that continues from this fork's current position.
    pub fn fork(&self) -> Self {
        let mut state = self.state.borrow_mut();
        let snapshot = state.forks[self.key].clone();
        let key = state.register(snapshot);
        Self {
            state: Rc::clone(&self.state),
            key,
        }
    }
}

impl<I> Fork<I, I::Item>
where
    I: Iterator,
    I::Item: Clone,
{
    /// Generator-style read that accepts an optional resumption value.
    ///
    /// Forks refuse resumption values so that every fork replays exactly the
    /// same sequence no matter how or when it is read. Passing `Some` fails
    /// with [`Error::InjectedValue`] without advancing the fork.
    ///
    /// ```
    /// use seqplex::{make_forkable, Error};
    ///
    /// let mut root = make_forkable(vec![1, 2, 3]);
    /// assert_eq!(root.resume(None), Ok(Some(1)));
    /// assert_eq!(root.resume(Some(7)), Err(Error::InjectedValue));
    /// assert_eq!(root.next(), Some(2));
    /// ```
    pub fn resume(&mut self, input: Option<I::Item>) -> Result<Option<I::Item>> {
        if input.is_some() {
            return Err(Error::InjectedValue);
        }
        Ok(self.next())
    }
}

/// Makes `source` forkable, returning the root [`Fork`].
pub fn make_forkable<I>(source: I) -> Fork<I::IntoIter, I::Item>
where
    I: IntoIterator,
    I::Item: Clone,
{
    Fork::new(source.into_iter())
}

/// Makes a [`Stream`] forkable, returning the root [`Fork`].
///
/// ```
/// use seqplex::make_forkable_stream;
/// use futures_util::stream;
/// use futures_util::StreamExt;
///
/// # tokio_test::block_on(async {
/// let mut root = make_forkable_stream(stream::iter(vec![1, 2, 3]));
/// assert_eq!(root.next().await, Some(1));
///
/// let forked = root.fork();
/// assert_eq!(forked.collect::<Vec<_>>().await, vec![2, 3]);
/// assert_eq!(root.collect::<Vec<_>>().await, vec![2, 3]);
/// # });
/// ```
pub fn make_forkable_stream<S>(source: S) -> Fork<S, S::Item>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    Fork::new(source)
}

/// Creates a fork of `target` at its current position.
pub fn fork<S, T>(target: &Fork<S, T>) -> Fork<S, T>
where
    T: Clone,
{
    target.fork()
}

impl<S, T> Clone for Fork<S, T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        self.fork()
    }
}

impl<S, T> Drop for Fork<S, T> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.reclaim(self.key);
        let parked = state.unpark();
        drop(state);
        parked.into_iter().for_each(Waker::wake);
    }
}

impl<S, T> fmt::Debug for Fork<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Fork");
        if let Ok(state) = self.state.try_borrow() {
            debug
                .field("buffered", &state.forks[self.key].len())
                .field("forks", &state.forks.len())
                .field("terminated", &state.cursor.is_terminated());
        }
        debug.finish_non_exhaustive()
    }
}

impl<I> Iterator for Fork<I, I::Item>
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
        Some(state.broadcast(self.key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let state = self.state.borrow();
        let buffered = state.forks[self.key].len();
        let (lower, upper) = Iterator::size_hint(&state.cursor);
        (
            lower.saturating_add(buffered),
            upper.and_then(|upper| upper.checked_add(buffered)),
        )
    }
}

impl<I> FusedIterator for Fork<I, I::Item>
where
    I: Iterator,
    I::Item: Clone,
{
}

impl<S> Stream for Fork<S, S::Item>
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
                let item = item.map(|value| state.broadcast(this.key, value));
                let parked = state.unpark();
                drop(state);
                parked.into_iter().for_each(Waker::wake);
                Poll::Ready(item)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let state = self.state.borrow();
        let buffered = state.forks[self.key].len();
        let (lower, upper) = Stream::size_hint(&state.cursor);
        (
            lower.saturating_add(buffered),
            upper.and_then(|upper| upper.checked_add(buffered)),
        )
    }
}

impl<S> FusedStream for Fork<S, S::Item>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    fn is_terminated(&self) -> bool {
        let state = self.state.borrow();
        state.cursor.is_terminated() && state.forks[self.key].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use futures_util::StreamExt;
    use std::cell::Cell;

    #[test]
    fn test_lockstep_with_root_reproduces_source() {
        let data = vec![1, 2, 3, 4, 5];
        let mut root = make_forkable(data.clone());
        let mut forked = fork(&root);

        let mut left = Vec::new();
        let mut right = Vec::new();
        loop {
            match (root.next(), forked.next()) {
                (Some(a), Some(b)) => {
                    left.push(a);
                    right.push(b);
                }
                (None, None) => break,
                other => panic!("forks diverged: {other:?}"),
            }
        }

        assert_eq!(left, data);
        assert_eq!(right, data);
    }

    #[test]
    fn test_fork_continues_from_current_point() {
        let mut root = make_forkable(vec![1, 2, 3, 4, 5]);
        assert_eq!(root.next(), Some(1));
        assert_eq!(root.next(), Some(2));

        let mut first = fork(&root);
        let mut second = fork(&root);
        assert_eq!(first.next(), Some(3));

        let third = fork(&first);
        assert_eq!(third.collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(first.collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(second.next(), Some(3));
        assert_eq!(second.collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(root.collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_fork_snapshot_is_independent() {
        let mut root = make_forkable(0..10);
        let mut lagging = root.fork();
        root.nth(4);
        assert_eq!(lagging.backlog(), 5);

        // Copies the five buffered values
        let mut copy = lagging.fork();
        assert_eq!(copy.backlog(), 5);

        assert_eq!(lagging.next(), Some(0));
        assert_eq!(lagging.next(), Some(1));
        assert_eq!(copy.backlog(), 5);
        assert_eq!(copy.next(), Some(0));
        assert_eq!(lagging.backlog(), 3);
    }

    #[test]
    fn test_dropped_fork_is_reclaimed() {
        let mut root = make_forkable(0..100);
        let abandoned = root.fork();
        let kept = root.fork();
        assert_eq!(root.live_forks(), 3);

        root.nth(9);
        assert_eq!(abandoned.backlog(), 10);

        drop(abandoned);
        assert_eq!(root.live_forks(), 2);

        // Only the surviving fork keeps receiving values
        root.nth(9);
        assert_eq!(kept.backlog(), 20);
        assert_eq!(root.live_forks(), 2);
    }

    #[test]
    fn test_forks_of_dropped_fork_survive() {
        let mut root = make_forkable(vec!['a', 'b', 'c']);
        let middle = root.fork();
        let leaf = middle.fork();
        drop(middle);

        assert_eq!(root.next(), Some('a'));
        assert_eq!(leaf.collect::<String>(), "abc");
        assert_eq!(root.live_forks(), 1);
    }

    #[test]
    fn test_root_can_be_dropped_before_its_forks() {
        let root = make_forkable(vec![1, 2, 3]);
        let forked = root.fork();
        drop(root);

        assert_eq!(forked.live_forks(), 1);
        assert_eq!(forked.collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clone_is_a_fork() {
        let mut root = make_forkable(vec![1, 2, 3]);
        root.next();

        let cloned = root.clone();
        assert_eq!(root.live_forks(), 2);
        assert_eq!(cloned.collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(root.live_forks(), 1);
    }

    #[test]
    fn test_resume_rejects_values() {
        let mut forked = fork(&make_forkable(vec![1, 2, 3]));

        assert_eq!(forked.resume(Some(1)), Err(Error::InjectedValue));
        assert_eq!(forked.resume(None), Ok(Some(1)));
        assert_eq!(forked.resume(Some(5)), Err(Error::InjectedValue));
        assert_eq!(forked.resume(None), Ok(Some(2)));
        assert_eq!(forked.resume(None), Ok(Some(3)));
        assert_eq!(forked.resume(None), Ok(None));
    }

    #[test]
    fn test_source_pulled_once_per_value() {
        let pulled = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulled);
        let source = (0..5).inspect(move |_| counter.set(counter.get() + 1));

        let root = make_forkable(source);
        let forks: Vec<_> = (0..4).map(|_| root.fork()).collect();
        drop(root);

        for forked in forks {
            assert_eq!(forked.collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        }
        assert_eq!(pulled.get(), 5);
    }

    #[test]
    fn test_size_hint_includes_buffer() {
        let mut root = make_forkable(vec![1, 2, 3, 4]);
        let lagging = root.fork();
        root.next();

        assert_eq!(root.size_hint(), (3, Some(3)));
        assert_eq!(lagging.size_hint(), (4, Some(4)));
    }

    #[test]
    fn test_unbounded_source() {
        let mut root = make_forkable(1u64..);
        let evens = root.fork().filter(|n| n % 2 == 0).take(3);
        assert_eq!(evens.collect::<Vec<_>>(), vec![2, 4, 6]);
        // The root was handed everything the dropped fork pulled
        assert_eq!(root.backlog(), 6);
        assert_eq!(root.next(), Some(1));
        assert_eq!(root.backlog(), 5);
        assert_eq!(root.live_forks(), 1);
    }

    #[test]
    fn test_not_send_or_sync() {
        type TestFork = Fork<std::vec::IntoIter<i32>, i32>;
        static_assertions::assert_not_impl_any!(TestFork: Send, Sync);
        static_assertions::assert_impl_all!(TestFork: Iterator, FusedIterator, Clone);
    }

    #[tokio::test]
    async fn test_stream_forks() {
        let mut root = make_forkable_stream(stream::iter(vec![10, 20, 30]));
        assert_eq!(root.next().await, Some(10));

        let first = root.fork();
        let second = fork(&first);

        let (a, b, c) = tokio::join!(
            first.collect::<Vec<i32>>(),
            second.collect::<Vec<i32>>(),
            (&mut root).collect::<Vec<i32>>()
        );
        assert_eq!(a, vec![20, 30]);
        assert_eq!(b, vec![20, 30]);
        assert_eq!(c, vec![20, 30]);
        assert!(root.is_terminated());
    }

    #[tokio::test]
    async fn test_pending_source_wakes_every_fork() {
        use tokio::sync::mpsc;
        use tokio_stream::wrappers::UnboundedReceiverStream;

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (tx, rx) = mpsc::unbounded_channel();
                let root = make_forkable_stream(UnboundedReceiverStream::new(rx));
                let tasks: Vec<_> = (0..3)
                    .map(|_| tokio::task::spawn_local(root.fork().collect::<Vec<char>>()))
                    .collect();
                drop(root);
                tokio::task::yield_now().await;

                for value in ['x', 'y', 'z'] {
                    tx.send(value).unwrap();
                    tokio::task::yield_now().await;
                }
                drop(tx);

                for task in tasks {
                    assert_eq!(task.await.unwrap(), vec!['x', 'y', 'z']);
                }
            })
            .await;
    }

    #[test]
    fn test_stream_fork_direct_poll() {
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut root = make_forkable_stream(stream::iter(vec![42]));
        let mut forked = root.fork();

        assert!(matches!(
            Pin::new(&mut root).poll_next(&mut cx),
            Poll::Ready(Some(42))
        ));
        assert_eq!(forked.backlog(), 1);
        assert!(!forked.is_terminated());

        assert!(matches!(
            Pin::new(&mut forked).poll_next(&mut cx),
            Poll::Ready(Some(42))
        ));
        assert!(matches!(
            Pin::new(&mut forked).poll_next(&mut cx),
            Poll::Ready(None)
        ));
        assert!(forked.is_terminated());
        assert!(root.is_terminated());
    }

    #[test]
    #[cfg(feature = "stats")]
    fn test_stats() {
        let mut root = make_forkable(0..10);
        let stats = root.stats();
        assert_eq!(stats.live_handles(), 1);

        let first = root.fork();
        let second = first.fork();
        assert_eq!(stats.live_handles(), 3);

        root.nth(3);
        // Four values in each of two lagging buffers
        assert_eq!(stats.buffered(), 8);

        drop(first);
        assert_eq!(stats.live_handles(), 2);
        assert_eq!(stats.buffered(), 4);

        drop(second);
        assert_eq!(stats.buffered(), 0);
        assert_eq!(stats.peak_buffered(), 8);
    }
}
