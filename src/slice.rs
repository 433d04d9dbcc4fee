//! Windowed, strided and optionally reversed slicing.
//!
//! [`slice`] follows the usual slicing rules: `start` is inclusive, `stop` is
//! exclusive, a negative bound counts from the end (`-1` is the last value)
//! and the sign of `step` picks the direction.
//!
//! Which strategy is used depends on the bounds:
//!
//! | direction | bounds                       | strategy                                  |
//! |-----------|------------------------------|-------------------------------------------|
//! | forward   | both from the front          | single pass, stops pulling at `stop`      |
//! | forward   | `start` from the end         | keeps the last `\|start\|` values          |
//! | forward   | only `stop` from the end     | lag buffer of `\|stop\|` values             |
//! | backward  | both from the front          | buffers `(stop, start]`, stops at `start` |
//! | backward  | `stop` from the end          | keeps the last `\|stop\| - 1` values       |
//! | backward  | `stop` is `-1`               | always empty, never reads the source      |
//! | backward  | only `start` from the end    | buffers everything after `stop`           |
//!
//! Whenever a bound is relative to the end, the source has to be read to its
//! end before the first value can be produced. Such slices never terminate on
//! an unbounded source.

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::window::{drain_tail, Forget};
use std::collections::VecDeque;
use std::iter::{FusedIterator, Skip, StepBy, Take};
use tracing::trace;

/// How a slice that depends on buffered values is resolved.
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Forward, with `start` counted from the end.
    FromEnd {
        keep: usize,
        stop: Option<isize>,
        step: usize,
    },
    /// Backward, in any combination of bounds.
    Backward {
        start: isize,
        stop: Option<isize>,
        step: usize,
    },
}

enum Window<I>
where
    I: Iterator,
{
    Streaming(StepBy<Skip<Take<Cursor<I>>>>),
    Lagging(StepBy<Forget<Skip<Cursor<I>>>>),
    Buffering { cursor: Cursor<I>, plan: Plan },
    Replay(std::vec::IntoIter<I::Item>),
}

/// Iterator over a window of a source, created by [`slice`].
pub struct Slice<I>
where
    I: Iterator,
{
    window: Window<I>,
}

/// Returns the values of `source` selected by `start`, `stop` and `step`.
///
/// `start` and `stop` may be `None`, an offset from the beginning, or a
/// negative offset from the end. `step` must not be zero; a negative step
/// walks backward, in which case `start` defaults to the last value.
///
/// # Errors
///
/// Returns [`Error::ZeroStep`] when `step` is zero. The source is not read.
///
/// # Examples
///
/// ```
/// use seqplex::slice;
///
/// # fn main() -> seqplex::Result<()> {
/// let data = [1, 2, 3, 4, 5];
/// assert_eq!(slice(data, Some(1), None, 1)?.collect::<Vec<_>>(), vec![2, 3, 4, 5]);
/// assert_eq!(slice(data, Some(1), Some(4), 2)?.collect::<Vec<_>>(), vec![2, 4]);
/// assert_eq!(slice(data, Some(1), Some(-2), 1)?.collect::<Vec<_>>(), vec![2, 3]);
/// assert_eq!(slice(data, Some(4), Some(1), -2)?.collect::<Vec<_>>(), vec![5, 3]);
///
/// // Backward over an unbounded source, as long as both bounds are known
/// let evens: Vec<u32> = slice(0.., Some(110), Some(99), -2)?.collect();
/// assert_eq!(evens, vec![110, 108, 106, 104, 102, 100]);
/// # Ok(())
/// # }
/// ```
pub fn slice<I>(
    source: I,
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
) -> Result<Slice<I::IntoIter>>
where
    I: IntoIterator,
{
    if step == 0 {
        return Err(Error::ZeroStep);
    }

    let cursor = Cursor::new(source.into_iter());
    let stride = step.unsigned_abs();
    let window = if step > 0 {
        forward(cursor, start.unwrap_or(0), stop, stride)
    } else {
        backward(cursor, start.unwrap_or(-1), stop, stride)
    };
    Ok(Slice { window })
}

fn forward<I>(cursor: Cursor<I>, start: isize, stop: Option<isize>, step: usize) -> Window<I>
where
    I: Iterator,
{
    if start < 0 {
        trace!(start, ?stop, step, "forward slice from the end");
        let plan = Plan::FromEnd {
            keep: start.unsigned_abs(),
            stop,
            step,
        };
        return Window::Buffering { cursor, plan };
    }

    let start = start.unsigned_abs();
    match stop {
        Some(stop) if stop < 0 => {
            trace!(start, stop, step, "forward slice with lag buffer");
            let lag = stop.unsigned_abs();
            Window::Lagging(Forget::new(cursor.skip(start), lag).step_by(step))
        }
        stop => {
            let stop = stop.map_or(usize::MAX, isize::unsigned_abs);
            if stop <= start {
                return Window::Replay(Vec::new().into_iter());
            }
            trace!(start, stop, step, "forward slice streaming");
            Window::Streaming(cursor.take(stop).skip(start).step_by(step))
        }
    }
}

fn backward<I>(cursor: Cursor<I>, start: isize, stop: Option<isize>, step: usize) -> Window<I>
where
    I: Iterator,
{
    trace!(start, ?stop, step, "backward slice");
    Window::Buffering {
        cursor,
        plan: Plan::Backward { start, stop, step },
    }
}

/// Reads what `plan` needs from `cursor` and returns the selected values in
/// emission order.
fn resolve<I>(cursor: &mut Cursor<I>, plan: Plan) -> Vec<I::Item>
where
    I: Iterator,
{
    match plan {
        Plan::FromEnd { keep, stop, step } => {
            let (buffer, len) = drain_tail(cursor, keep);
            // The retained values start exactly at max(len - keep, 0).
            let start = len - buffer.len();
            let stop = match stop {
                None => len,
                Some(stop) if stop < 0 => len.saturating_sub(stop.unsigned_abs()),
                Some(stop) => stop.unsigned_abs().min(len),
            };
            trace!(len, start, stop, "resolved forward slice");
            buffer
                .into_iter()
                .take(stop.saturating_sub(start))
                .step_by(step)
                .collect()
        }
        Plan::Backward { start, stop, step } => resolve_backward(cursor, start, stop, step),
    }
}

fn resolve_backward<I>(
    cursor: &mut Cursor<I>,
    start: isize,
    stop: Option<isize>,
    step: usize,
) -> Vec<I::Item>
where
    I: Iterator,
{
    match stop {
        // Nothing lies above the last value.
        Some(-1) => Vec::new(),
        Some(stop) if stop < 0 => {
            // Only the last |stop| - 1 values can lie above the stop.
            let (buffer, len) = drain_tail(cursor, stop.unsigned_abs() - 1);
            let base = len - buffer.len();
            let len = len as isize;
            let start = if start < 0 {
                len + start
            } else {
                start.min(len - 1)
            };
            let stop = (len + stop).max(-1);
            trace!(len, start, stop, "resolved backward slice");
            reversed(buffer, base, start, stop, step)
        }
        stop if start >= 0 => {
            let stop = stop.unwrap_or(-1);
            if stop >= start {
                return Vec::new();
            }
            let base = (stop + 1).unsigned_abs();
            if !skip(cursor, base) {
                return Vec::new();
            }
            // Nothing past `start` is ever needed, so unbounded sources are fine.
            let span = start.abs_diff(stop);
            let buffer: VecDeque<_> = cursor.by_ref().take(span).collect();
            let last = (base + buffer.len()) as isize - 1;
            reversed(buffer, base, last, stop, step)
        }
        stop => {
            let stop = stop.unwrap_or(-1);
            // A stop past every addressable index leaves nothing above it.
            let Some(base) = stop.checked_add(1).map(isize::unsigned_abs) else {
                return Vec::new();
            };
            if !skip(cursor, base) {
                return Vec::new();
            }
            let buffer: VecDeque<_> = cursor.by_ref().collect();
            let len = (base + buffer.len()) as isize;
            trace!(len, start = len + start, stop, "resolved backward slice");
            reversed(buffer, base, len + start, stop, step)
        }
    }
}

/// Discards `count` values; returns `false` if the source ran out first.
fn skip<I>(cursor: &mut Cursor<I>, count: usize) -> bool
where
    I: Iterator,
{
    count == 0 || cursor.nth(count - 1).is_some()
}

/// Picks the values at logical indices `start, start - step, ...` that lie
/// above `stop`. `buffer[0]` holds logical index `base`.
fn reversed<T>(buffer: VecDeque<T>, base: usize, start: isize, stop: isize, step: usize) -> Vec<T> {
    if start <= stop {
        return Vec::new();
    }

    let base = base as isize;
    let mut values = Vec::from(buffer);
    values.truncate((start - base + 1).max(0).unsigned_abs());
    values.drain(..(stop + 1 - base).max(0).unsigned_abs());
    values.into_iter().rev().step_by(step).collect()
}

impl<I> Iterator for Slice<I>
where
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if let Window::Buffering { cursor, plan } = &mut self.window {
            let values = resolve(cursor, *plan);
            self.window = Window::Replay(values.into_iter());
        }

        match &mut self.window {
            Window::Streaming(values) => values.next(),
            Window::Lagging(values) => values.next(),
            Window::Replay(values) => values.next(),
            Window::Buffering { .. } => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.window {
            Window::Streaming(values) => values.size_hint(),
            Window::Lagging(values) => values.size_hint(),
            Window::Replay(values) => values.size_hint(),
            Window::Buffering { cursor, .. } => (0, cursor.size_hint().1),
        }
    }
}

impl<I> FusedIterator for Slice<I> where I: Iterator {}
