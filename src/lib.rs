//! Replicating and windowing sequences that can only be read once.
//!
//! An iterator or a stream is consumed as it is read. This crate provides
//! ways to read one source several times without materializing it, and to
//! select windows of it with bounds counted from either end.
//!
//! - [`tee`] splits a source into N copies that share one buffer.
//! - [`make_forkable`] wraps a source into a root [`Fork`]; every fork
//!   continues from the position of the fork it was created from.
//! - [`slice`] selects `start..stop` with a step, negative bounds and
//!   backward traversal.
//! - [`tail`] and [`forget`] keep or drop the last N values.
//!
//! # Examples
//!
//! ```
//! use seqplex::{make_forkable, slice, tee};
//!
//! # fn main() -> seqplex::Result<()> {
//! let mut copies = tee(vec![1, 2, 3], 2);
//! let second = copies.pop().unwrap();
//! let first = copies.pop().unwrap();
//! assert_eq!(first.collect::<Vec<_>>(), vec![1, 2, 3]);
//! assert_eq!(second.collect::<Vec<_>>(), vec![1, 2, 3]);
//!
//! let mut root = make_forkable(1..=5);
//! assert_eq!(root.next(), Some(1));
//! let rest = root.fork();
//! assert_eq!(rest.collect::<Vec<_>>(), vec![2, 3, 4, 5]);
//!
//! let window: Vec<_> = slice(1..=5, Some(4), Some(1), -2)?.collect();
//! assert_eq!(window, vec![5, 3]);
//! # Ok(())
//! # }
//! ```
//!
//! Every combinator is also available as a method through [`SeqplexExt`]:
//!
//! ```
//! use seqplex::SeqplexExt;
//!
//! let last: Vec<_> = (0..100).tail(3).collect();
//! assert_eq!(last, vec![97, 98, 99]);
//! ```
//!
//! # Streams
//!
//! [`Tee`] and [`Fork`] are [`Stream`](futures_util::Stream)s when built over
//! a stream. The source must be [`Unpin`]; pin it with [`Box::pin`] first
//! otherwise.
//!
//! ```
//! use seqplex::SeqplexStreamExt;
//! use futures_util::stream;
//! use futures_util::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let mut copies = stream::iter(vec!["a", "b"]).tee(2);
//! let second = copies.pop().unwrap();
//! let first = copies.pop().unwrap();
//!
//! let (left, right) = tokio::join!(
//!     first.collect::<Vec<_>>(),
//!     second.collect::<Vec<_>>()
//! );
//! assert_eq!(left, right);
//! # });
//! ```
//!
//! # Thread Safety
//!
//! Handles that share a source hold it behind an `Rc<RefCell<_>>`. They are
//! neither [`Send`] nor [`Sync`]; all copies of a source live on one thread.
//! Async consumers can run concurrently as tasks of a single-threaded
//! executor such as `tokio::task::LocalSet`.
//!
//! # Memory
//!
//! - A tee keeps the values between its slowest and fastest consumer.
//! - Each fork keeps the values its creator had not yet read, plus every
//!   value pulled from the source since.
//! - Dropping a lagging copy or fork releases what was kept for it.
//!
//! Prefer cheap-to-clone items (`Arc<T>` for large data).
//!
//! # Feature flags
//!
//! - `stats`: shared atomic counters of live handles and buffered values,
//!   exposed by `Tee::stats` and `Fork::stats`.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod cursor;
mod error;
mod ext;
mod fork;
mod slice;
#[cfg(feature = "stats")]
mod stats;
mod tee;
mod window;

pub use cursor::{cursor, Cursor};
pub use error::{Error, Result};
pub use ext::{SeqplexExt, SeqplexStreamExt};
pub use fork::{fork, make_forkable, make_forkable_stream, Fork};
pub use slice::{slice, Slice};
#[cfg(feature = "stats")]
pub use stats::Stats;
pub use tee::{tee, tee_stream, Tee};
pub use window::{forget, tail, Forget, Tail};
