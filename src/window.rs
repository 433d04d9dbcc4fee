//! Bounded-buffer windows over the end of a sequence.
//!
//! Neither window can know where the end is until the source is exhausted,
//! so both keep a buffer no larger than `limit`.

use crate::cursor::Cursor;
use std::collections::{vec_deque, VecDeque};
use std::iter::FusedIterator;
use tracing::trace;

/// Drains `source`, keeping at most the last `keep` values.
///
/// Returns the retained values together with the total number of values the
/// source produced.
pub(crate) fn drain_tail<I>(source: &mut I, keep: usize) -> (VecDeque<I::Item>, usize)
where
    I: Iterator,
{
    let mut buffer = VecDeque::with_capacity(keep.min(1024));
    let mut len = 0;
    for value in source {
        len += 1;
        if keep == 0 {
            continue;
        }
        if buffer.len() == keep {
            buffer.pop_front();
        }
        buffer.push_back(value);
    }
    trace!(len, kept = buffer.len(), "drained source to its tail");
    (buffer, len)
}

enum TailState<I>
where
    I: Iterator,
{
    Filling { cursor: Cursor<I>, limit: usize },
    Draining(vec_deque::IntoIter<I::Item>),
}

/// Iterator over the last `limit` values of a source, created by [`tail`].
pub struct Tail<I>
where
    I: Iterator,
{
    state: TailState<I>,
}

impl<I> Iterator for Tail<I>
where
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if let TailState::Filling { cursor, limit } = &mut self.state {
            let (buffer, _) = drain_tail(cursor, *limit);
            self.state = TailState::Draining(buffer.into_iter());
        }

        match &mut self.state {
            TailState::Draining(values) => values.next(),
            TailState::Filling { .. } => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.state {
            TailState::Filling { cursor, limit } => {
                let (lower, upper) = cursor.size_hint();
                (
                    lower.min(*limit),
                    Some(upper.map_or(*limit, |upper| upper.min(*limit))),
                )
            }
            TailState::Draining(values) => values.size_hint(),
        }
    }
}

impl<I> FusedIterator for Tail<I> where I: Iterator {}

/// Returns the last `limit` values of `source`.
///
/// The source is read to its end on the first call to `next`. With
/// `limit == 0` nothing is yielded and the source is never read.
///
/// ```
/// use seqplex::tail;
///
/// assert_eq!(tail(vec![1, 2, 3, 4, 5], 2).collect::<Vec<_>>(), vec![4, 5]);
/// assert_eq!(tail(vec![1], 2).collect::<Vec<_>>(), vec![1]);
/// assert_eq!(tail(vec![1, 2, 3], 0).count(), 0);
/// ```
pub fn tail<I>(source: I, limit: usize) -> Tail<I::IntoIter>
where
    I: IntoIterator,
{
    let state = if limit == 0 {
        TailState::Draining(VecDeque::new().into_iter())
    } else {
        TailState::Filling {
            cursor: Cursor::new(source.into_iter()),
            limit,
        }
    };
    Tail { state }
}

/// Iterator over all but the last `limit` values of a source, created by
/// [`forget`].
pub struct Forget<I>
where
    I: Iterator,
{
    source: I,
    lag: usize,
    buffer: VecDeque<I::Item>,
}

impl<I> Forget<I>
where
    I: Iterator,
{
    pub(crate) fn new(source: I, lag: usize) -> Self {
        Self {
            source,
            lag,
            buffer: VecDeque::with_capacity(lag.min(1024).saturating_add(1)),
        }
    }
}

impl<I> Iterator for Forget<I>
where
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        // A value is released once `lag` newer values are known to follow it.
        loop {
            match self.source.next() {
                Some(value) => {
                    self.buffer.push_back(value);
                    if self.buffer.len() > self.lag {
                        return self.buffer.pop_front();
                    }
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.source.size_hint();
        let pending = self.buffer.len();
        let shrink = |n: usize| n.saturating_add(pending).saturating_sub(self.lag);
        (shrink(lower), upper.map(shrink))
    }
}

impl<I> FusedIterator for Forget<I> where I: FusedIterator {}

/// Returns every value of `source` except the last `limit`.
///
/// ```
/// use seqplex::forget;
///
/// assert_eq!(forget(vec![1, 2, 3, 4, 5], 2).collect::<Vec<_>>(), vec![1, 2, 3]);
/// assert_eq!(forget(vec![1], 2).count(), 0);
/// assert_eq!(forget(vec![1, 2, 3], 0).collect::<Vec<_>>(), vec![1, 2, 3]);
/// ```
pub fn forget<I>(source: I, limit: usize) -> Forget<Cursor<I::IntoIter>>
where
    I: IntoIterator,
{
    Forget::new(Cursor::new(source.into_iter()), limit)
}
