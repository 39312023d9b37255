//! Bounded segment buffer.
//!
//! A single-producer/single-consumer FIFO of `SegmentPayload`. Built on a
//! bounded `tokio::sync::mpsc` channel (which already blocks `send` while
//! full and `recv` while empty) plus an `AtomicUsize` depth counter the
//! Stream's chunk-count observable reads.

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SegmentPayload {
    pub bytes: Bytes,
}

/// Shared depth counter, published on every push and pop.
#[derive(Debug, Default)]
pub struct ChunkCount(AtomicUsize);

impl ChunkCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

pub struct SegmentProducer {
    tx: mpsc::Sender<SegmentPayload>,
    depth: Arc<ChunkCount>,
}

pub struct SegmentConsumer {
    rx: mpsc::Receiver<SegmentPayload>,
    depth: Arc<ChunkCount>,
    target_depth: usize,
    initial_fill_reached: bool,
}

/// Construct a bounded buffer with capacity `max_depth`.
pub fn channel(target_depth: usize, max_depth: usize) -> (SegmentProducer, SegmentConsumer, Arc<ChunkCount>) {
    let (tx, rx) = mpsc::channel(max_depth.max(1));
    let depth = Arc::new(ChunkCount::default());
    (
        SegmentProducer {
            tx,
            depth: Arc::clone(&depth),
        },
        SegmentConsumer {
            rx,
            depth: Arc::clone(&depth),
            target_depth,
            initial_fill_reached: false,
        },
        depth,
    )
}

impl SegmentProducer {
    /// Blocks while the buffer is at `max_depth`.
    pub async fn push(&self, payload: SegmentPayload) -> Result<(), SegmentPayload> {
        self.tx.send(payload).await.map_err(|e| e.0)?;
        self.depth.0.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl SegmentConsumer {
    /// Blocks while empty and the producer is still active; returns `None`
    /// once the producer has signalled end-of-stream and the queue drains.
    pub async fn pop(&mut self) -> Option<SegmentPayload> {
        let payload = self.rx.recv().await;
        if payload.is_some() {
            self.depth.0.fetch_sub(1, Ordering::AcqRel);
        }
        payload
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// The "initial fill" startup gate: true once depth has reached
    /// `target_depth` at least once, and stays true for the stream's lifetime.
    /// Also latches once the producer side has gone away, so a short-lived
    /// (e.g. VOD-terminated) playlist with fewer than `target_depth` segments
    /// doesn't wait forever for a fill level that will never arrive.
    pub fn initial_fill_satisfied(&mut self) -> bool {
        if self.initial_fill_reached {
            return true;
        }
        if self.depth() >= self.target_depth || self.rx.is_closed() {
            self.initial_fill_reached = true;
        }
        self.initial_fill_reached
    }
}
