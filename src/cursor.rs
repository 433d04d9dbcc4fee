//! Exclusive, fused read position into a source.
//!
//! Every other component of the crate reads its source through a [`Cursor`].
//! The cursor owns the source, so once a multiplexer holds it nothing else can
//! read from the source directly.

use futures_util::stream::{FusedStream, Stream, StreamExt};
use std::iter::FusedIterator;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A one-step-at-a-time reader over an [`Iterator`] or a [`Stream`].
///
/// The first end marker terminates the cursor: the source is dropped and every
/// later pull reports the end again without touching it.
///
/// ```
/// use seqplex::cursor;
///
/// let mut cursor = cursor(vec![1, 2]);
/// assert_eq!(cursor.pull(), Some(1));
/// assert_eq!(cursor.pull(), Some(2));
/// assert_eq!(cursor.pull(), None);
/// assert!(cursor.is_terminated());
/// assert_eq!(cursor.pulled(), 2);
/// ```
#[derive(Debug)]
pub struct Cursor<S> {
    source: Option<S>,
    pulled: usize,
}

impl<S> Cursor<S> {
    /// Takes exclusive ownership of `source`.
    pub fn new(source: S) -> Self {
        Self {
            source: Some(source),
            pulled: 0,
        }
    }

    /// Number of values drawn from the source so far.
    pub fn pulled(&self) -> usize {
        self.pulled
    }

    /// Returns `true` once the source has reported its end.
    pub fn is_terminated(&self) -> bool {
        self.source.is_none()
    }

    fn settle<T>(&mut self, item: Option<T>) -> Option<T> {
        match item {
            Some(value) => {
                self.pulled += 1;
                Some(value)
            }
            None => {
                self.source.take();
                None
            }
        }
    }
}

/// Returns a [`Cursor`] over anything that can be iterated.
pub fn cursor<I>(source: I) -> Cursor<I::IntoIter>
where
    I: IntoIterator,
{
    Cursor::new(source.into_iter())
}

impl<I> Cursor<I>
where
    I: Iterator,
{
    /// Pulls the next value, or `None` once the source is exhausted.
    pub fn pull(&mut self) -> Option<I::Item> {
        let item = self.source.as_mut()?.next();
        self.settle(item)
    }
}

impl<S> Cursor<S>
where
    S: Stream + Unpin,
{
    /// Polls the next value, or `Poll::Ready(None)` once the source is exhausted.
    pub fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Poll::Ready(None),
        };

        match source.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(item) => Poll::Ready(self.settle(item)),
        }
    }
}

impl<I> Iterator for Cursor<I>
where
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.source {
            Some(source) => source.size_hint(),
            None => (0, Some(0)),
        }
    }
}

impl<I> FusedIterator for Cursor<I> where I: Iterator {}

impl<S> Stream for Cursor<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_pull(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.source {
            Some(source) => source.size_hint(),
            None => (0, Some(0)),
        }
    }
}

impl<S> FusedStream for Cursor<S>
where
    S: Stream + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.source.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_pull_counts_values() {
        let mut cursor = cursor(vec!['a', 'b', 'c']);

        assert_eq!(cursor.size_hint(), (3, Some(3)));
        assert_eq!(cursor.pull(), Some('a'));
        assert_eq!(cursor.pulled(), 1);
        assert!(!cursor.is_terminated());

        let rest: Vec<char> = cursor.by_ref().collect();
        assert_eq!(rest, vec!['b', 'c']);
        assert_eq!(cursor.pulled(), 3);
        assert!(cursor.is_terminated());
        assert_eq!(cursor.size_hint(), (0, Some(0)));
    }

    #[test]
    fn test_source_is_not_read_after_end() {
        // A source that counts how often it was asked and resumes after its end
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let source = std::iter::from_fn(move || {
            counter.set(counter.get() + 1);
            match counter.get() {
                1 => Some(1),
                2 => None,
                _ => Some(99),
            }
        });

        let mut cursor = Cursor::new(source);
        assert_eq!(cursor.pull(), Some(1));
        assert_eq!(cursor.pull(), None);
        assert_eq!(cursor.pull(), None);
        assert_eq!(cursor.pull(), None);

        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_stream_cursor() {
        let mut cursor = Cursor::new(stream::iter(vec![1, 2, 3]));

        assert!(!FusedStream::is_terminated(&cursor));
        assert_eq!(Stream::size_hint(&cursor), (3, Some(3)));

        let collected: Vec<i32> = (&mut cursor).collect().await;
        assert_eq!(collected, vec![1, 2, 3]);
        assert!(FusedStream::is_terminated(&cursor));
        assert_eq!(cursor.next().await, None);
        assert_eq!(cursor.pulled(), 3);
    }

    #[test]
    fn test_poll_pull_empty_stream() {
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut cursor = Cursor::new(stream::iter(Vec::<u8>::new()));
        assert!(matches!(cursor.poll_pull(&mut cx), Poll::Ready(None)));
        assert!(matches!(cursor.poll_pull(&mut cx), Poll::Ready(None)));
        assert_eq!(cursor.pulled(), 0);
    }
}
