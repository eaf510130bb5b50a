use crate::error::QueueClosed;
use crate::request::Request;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Creates the bounded queue between reactor shards and the dispatch path.
///
/// Pushing blocks while the queue is full; that is the only backpressure between
/// handler latency and socket reads.
pub fn request_queue(capacity: usize) -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = Arc::new(AtomicBool::new(false));
    (
        RequestSender {
            tx,
            closed: Arc::clone(&closed),
        },
        RequestReceiver { rx, closed },
    )
}

/// Producer half. Cloned once per reactor shard; the server keeps the original
/// and closes it as the last step of shutdown.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<Request>,
    closed: Arc<AtomicBool>,
}

impl RequestSender {
    /// Waits for capacity, then enqueues `request`.
    pub async fn push(&self, request: Request) -> Result<(), QueueClosed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueClosed);
        }
        self.tx.send(request).await.map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Marks the queue closed and releases this producer.
    ///
    /// The consumer sees end-of-stream once every clone is gone and the buffered
    /// requests are drained.
    pub fn close(self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub struct RequestReceiver {
    rx: mpsc::Receiver<Request>,
    closed: Arc<AtomicBool>,
}

impl RequestReceiver {
    /// Next request, or `None` once the queue is closed and drained.
    /// Must not be called from inside an async runtime.
    pub fn blocking_next(&mut self) -> Option<Request> {
        self.rx.blocking_recv()
    }

    pub async fn next(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    /// Next buffered request without waiting.
    pub fn try_next(&mut self) -> Option<Request> {
        self.rx.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
