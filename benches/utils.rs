use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug)]
pub struct Frame {
    pub _seq: u64,
    pub _payload: [u8; 1024],
}
pub type SharedFrame = Arc<Frame>;
pub const NUM_CONSUMERS: usize = 5;

fn frames(count: u64) -> Vec<SharedFrame> {
    (0..count)
        .map(|seq| {
            Arc::new(Frame {
                _seq: seq,
                _payload: [0; 1024],
            })
        })
        .collect()
}

// Iterator sources

pub fn frame_iter(count: u64) -> std::vec::IntoIter<SharedFrame> {
    frames(count).into_iter()
}

/// Baseline for iterator fan-out: collect once, then hand out clones.
pub fn collect_fan_out<I>(source: I) -> Vec<std::vec::IntoIter<I::Item>>
where
    I: Iterator,
    I::Item: Clone,
{
    let collected: Vec<_> = source.collect();
    (0..NUM_CONSUMERS)
        .map(|_| collected.clone().into_iter())
        .collect()
}

// Stream sources

pub fn frame_stream(count: u64) -> futures_util::stream::Iter<std::vec::IntoIter<SharedFrame>> {
    futures_util::stream::iter(frames(count))
}

/// Wakes itself before every value to force a round trip through the executor.
pub struct YieldingStream {
    frames: Vec<SharedFrame>,
    index: usize,
}

impl Stream for YieldingStream {
    type Item = SharedFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.index >= self.frames.len() {
            return Poll::Ready(None);
        }

        cx.waker().wake_by_ref();

        let frame = self.frames[self.index].clone();
        self.index += 1;
        Poll::Ready(Some(frame))
    }
}

pub fn yielding_stream(count: u64) -> YieldingStream {
    YieldingStream {
        frames: frames(count),
        index: 0,
    }
}

/// Baseline for stream fan-out: one task forwarding into a channel per consumer.
pub fn channel_fan_out<S>(mut source: S) -> Vec<ReceiverStream<SharedFrame>>
where
    S: Stream<Item = SharedFrame> + Unpin + Send + 'static,
{
    let mut txs = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..NUM_CONSUMERS {
        let (tx, rx) = mpsc::channel(1024);
        txs.push(tx);
        receivers.push(ReceiverStream::new(rx));
    }

    tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            for tx in &txs {
                let _ = tx.send(frame.clone()).await;
            }
        }
    });
    receivers
}
