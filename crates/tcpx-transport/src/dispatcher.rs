use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, ThreadId};
use tcpx_core::{Request, RequestReceiver, RouterTable};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of dispatch-path counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Requests taken off the queue and resolved, successful or not.
    pub dispatched: u64,
    /// Requests with no handler, or whose handler failed or panicked.
    pub failed: u64,
}

/// The dispatch path: drains the request queue and runs handlers.
///
/// With one lane every handler runs on a single thread in queue order. With
/// `n > 1` lanes the queue is partitioned by connection id; order holds per
/// connection only.
pub struct Dispatcher {
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_ids: Vec<ThreadId>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn spawn(queue: RequestReceiver, router: Arc<RouterTable>, lanes: usize, lane_capacity: usize) -> std::io::Result<Self> {
        let counters = Arc::new(Counters::default());
        let mut thread_ids = Vec::new();

        let thread = if lanes <= 1 {
            let counters = Arc::clone(&counters);
            std::thread::Builder::new()
                .name("tcpx-dispatch".to_string())
                .spawn(move || run_ordered(queue, &router, &counters))?
        } else {
            let mut senders = Vec::with_capacity(lanes);
            let mut lane_threads = Vec::with_capacity(lanes);
            for lane in 0..lanes {
                let (tx, rx) = mpsc::channel::<Request>(lane_capacity.max(1));
                let router = Arc::clone(&router);
                let counters = Arc::clone(&counters);
                let handle = std::thread::Builder::new()
                    .name(format!("tcpx-dispatch-lane-{}", lane))
                    .spawn(move || run_lane(rx, &router, &counters))?;
                thread_ids.push(handle.thread().id());
                senders.push(tx);
                lane_threads.push(handle);
            }
            std::thread::Builder::new()
                .name("tcpx-dispatch".to_string())
                .spawn(move || run_partitioned(queue, senders, lane_threads))?
        };
        thread_ids.push(thread.thread().id());

        Ok(Self {
            thread: Mutex::new(Some(thread)),
            thread_ids,
            counters,
        })
    }

    /// Waits for the dispatch path to drain the closed queue and exit.
    ///
    /// Returns `false` without waiting when called from a dispatch thread
    /// (a handler stopping its own server) or when already joined.
    pub fn join(&self) -> bool {
        if self.thread_ids.contains(&std::thread::current().id()) {
            return false;
        }
        let thread = self.thread.lock().ok().and_then(|mut t| t.take());
        match thread {
            Some(thread) => {
                if thread.join().is_err() {
                    tracing::error!("dispatch thread panicked");
                }
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

fn execute(router: &RouterTable, request: &Request, counters: &Counters) {
    counters.dispatched.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = router.dispatch(request) {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            msg_id = %request.msg_id(),
            conn_id = %request.connection_id(),
            error = %e,
            "dispatch failed"
        );
    }
}

fn run_ordered(mut queue: RequestReceiver, router: &RouterTable, counters: &Counters) {
    while let Some(request) = queue.blocking_next() {
        execute(router, &request, counters);
    }
    tracing::debug!("dispatch path drained");
}

fn run_lane(mut rx: mpsc::Receiver<Request>, router: &RouterTable, counters: &Counters) {
    while let Some(request) = rx.blocking_recv() {
        execute(router, &request, counters);
    }
}

fn run_partitioned(mut queue: RequestReceiver, senders: Vec<mpsc::Sender<Request>>, lanes: Vec<JoinHandle<()>>) {
    let n = senders.len() as u64;
    while let Some(request) = queue.blocking_next() {
        let lane = (request.connection_id().raw() % n) as usize;
        if senders[lane].blocking_send(request).is_err() {
            tracing::error!(lane, "dispatch lane exited early, request dropped");
        }
    }
    drop(senders);
    for (lane, handle) in lanes.into_iter().enumerate() {
        if handle.join().is_err() {
            tracing::error!(lane, "dispatch lane panicked");
        }
    }
    tracing::debug!("partitioned dispatch path drained");
}
