//! Extension traits exposing every combinator as a method.
//!
//! [`SeqplexExt`] is implemented for every [`Iterator`] and
//! [`SeqplexStreamExt`] for every [`Stream`], so that
//! `source.tee(2)` reads the same as `tee(source, 2)`.

use crate::cursor::Cursor;
use crate::error::Result;
use crate::fork::Fork;
use crate::slice::Slice;
use crate::tee::Tee;
use crate::window::{Forget, Tail};
use futures_util::stream::Stream;

/// Extension trait for [`Iterator`] providing the tee, fork and window
/// combinators.
pub trait SeqplexExt: Iterator {
    /// Splits this iterator into `count` independent copies.
    ///
    /// See [`tee`](crate::tee()).
    ///
    /// ```
    /// use seqplex::SeqplexExt;
    ///
    /// let mut copies = "ab".chars().tee(2);
    /// let second = copies.pop().unwrap();
    /// let first = copies.pop().unwrap();
    /// assert_eq!(first.collect::<String>(), "ab");
    /// assert_eq!(second.collect::<String>(), "ab");
    /// ```
    fn tee(self, count: usize) -> Vec<Tee<Self, Self::Item>>
    where
        Self: Sized,
        Self::Item: Clone,
    {
        crate::tee::tee(self, count)
    }

    /// Makes this iterator forkable, returning the root [`Fork`].
    ///
    /// ```
    /// use seqplex::SeqplexExt;
    ///
    /// let mut root = (1..=4).into_forkable();
    /// root.next();
    /// let rest = root.fork();
    /// assert_eq!(rest.collect::<Vec<_>>(), vec![2, 3, 4]);
    /// ```
    fn into_forkable(self) -> Fork<Self, Self::Item>
    where
        Self: Sized,
        Self::Item: Clone,
    {
        Fork::new(self)
    }

    /// Selects a window of this iterator, see [`slice`](crate::slice()).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroStep`](crate::Error::ZeroStep) when `step` is zero.
    ///
    /// ```
    /// use seqplex::SeqplexExt;
    ///
    /// # fn main() -> seqplex::Result<()> {
    /// let reversed: String = "abcdefgh".chars().slice(Some(6), Some(1), -3)?.collect();
    /// assert_eq!(reversed, "gd");
    /// # Ok(())
    /// # }
    /// ```
    fn slice(self, start: Option<isize>, stop: Option<isize>, step: isize) -> Result<Slice<Self>>
    where
        Self: Sized,
    {
        crate::slice::slice(self, start, stop, step)
    }

    /// Yields only the last `limit` values of this iterator.
    fn tail(self, limit: usize) -> Tail<Self>
    where
        Self: Sized,
    {
        crate::window::tail(self, limit)
    }

    /// Yields everything except the last `limit` values of this iterator.
    fn forget(self, limit: usize) -> Forget<Cursor<Self>>
    where
        Self: Sized,
    {
        crate::window::forget(self, limit)
    }
}

impl<I> SeqplexExt for I where I: Iterator {}

/// Extension trait for [`Stream`] providing the tee and fork combinators.
///
/// The stream must be [`Unpin`]; pin it with [`Box::pin`] first otherwise.
pub trait SeqplexStreamExt: Stream {
    /// Splits this stream into `count` independent copies.
    ///
    /// ```
    /// use seqplex::SeqplexStreamExt;
    /// use futures_util::stream;
    /// use futures_util::StreamExt;
    ///
    /// # tokio_test::block_on(async {
    /// let mut copies = stream::iter(vec![1, 2]).tee(2);
    /// let second = copies.pop().unwrap();
    /// let first = copies.pop().unwrap();
    /// let (left, right) = tokio::join!(first.collect::<Vec<_>>(), second.collect::<Vec<_>>());
    /// assert_eq!(left, right);
    /// # });
    /// ```
    fn tee(self, count: usize) -> Vec<Tee<Self, Self::Item>>
    where
        Self: Sized + Unpin,
        Self::Item: Clone,
    {
        crate::tee::tee_stream(self, count)
    }

    /// Makes this stream forkable, returning the root [`Fork`].
    fn into_forkable(self) -> Fork<Self, Self::Item>
    where
        Self: Sized + Unpin,
        Self::Item: Clone,
    {
        Fork::new(self)
    }
}

impl<S> SeqplexStreamExt for S where S: Stream {}
