use crate::error::ReactorError;
use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tcpx_core::{CodecError, Connection, ConnectionRegistry, Request, RequestSender};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Readiness multiplexer feeding decoded requests into the shared queue.
pub trait Reactor: Send + Sync + 'static {
    /// Binds the registry shards report disconnects to. Called once, before `start`.
    fn init(&mut self, registry: Arc<ConnectionRegistry>) -> Result<(), ReactorError>;

    /// Spawns the shards. Every shard produces into `output`.
    fn start(&mut self, output: RequestSender) -> Result<(), ReactorError>;

    /// Admits a connection into exactly one shard for read readiness.
    fn add_read(&self, conn: Arc<Connection>) -> Result<(), ReactorError>;

    /// Halts every shard. Once this returns no shard pushes into `output` again.
    fn stop(&self);
}

enum ShardSignal {
    Admit(Arc<Connection>),
    Shutdown,
}

struct ShardHandle {
    control: mpsc::UnboundedSender<ShardSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Pool of event-loop shards, one OS thread and one current-thread runtime each.
///
/// A connection is pinned to shard `id % size` for its whole life, so its
/// frames reach the queue in read order.
pub struct EventLoopPool {
    size: usize,
    read_buffer: usize,
    registry: Option<Arc<ConnectionRegistry>>,
    shards: Vec<ShardHandle>,
    stopped: AtomicBool,
}

impl EventLoopPool {
    pub fn new(size: usize, read_buffer: usize) -> Self {
        Self {
            size: size.max(1),
            read_buffer: read_buffer.max(1),
            registry: None,
            shards: Vec::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shard_of(&self, conn: &Connection) -> usize {
        (conn.id().raw() % self.size as u64) as usize
    }

    fn spawn_shard(
        &self,
        id: usize,
        registry: &Arc<ConnectionRegistry>,
        output: &RequestSender,
    ) -> Result<ShardHandle, ReactorError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ReactorError::Runtime)?;

        let (control, control_rx) = mpsc::unbounded_channel();
        let worker = ShardWorker {
            id,
            control: control_rx,
            output: output.clone(),
            registry: Arc::clone(registry),
            read_buffer: self.read_buffer,
        };

        let thread = std::thread::Builder::new()
            .name(format!("tcpx-loop-{}", id))
            .spawn(move || rt.block_on(worker.run()))
            .map_err(ReactorError::Spawn)?;

        Ok(ShardHandle {
            control,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl Reactor for EventLoopPool {
    fn init(&mut self, registry: Arc<ConnectionRegistry>) -> Result<(), ReactorError> {
        if !self.shards.is_empty() {
            return Err(ReactorError::AlreadyStarted);
        }
        self.registry = Some(registry);
        Ok(())
    }

    fn start(&mut self, output: RequestSender) -> Result<(), ReactorError> {
        let registry = self.registry.clone().ok_or(ReactorError::NotInitialized)?;
        if !self.shards.is_empty() {
            return Err(ReactorError::AlreadyStarted);
        }

        for id in 0..self.size {
            match self.spawn_shard(id, &registry, &output) {
                Ok(shard) => self.shards.push(shard),
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
        tracing::debug!(shards = self.size, "event loops started");
        Ok(())
    }

    fn add_read(&self, conn: Arc<Connection>) -> Result<(), ReactorError> {
        if self.shards.is_empty() || self.stopped.load(Ordering::Acquire) {
            return Err(ReactorError::NotRunning);
        }
        if conn.is_closed() {
            return Err(ReactorError::Unavailable(conn.id()));
        }
        let idx = self.shard_of(&conn);
        self.shards[idx]
            .control
            .send(ShardSignal::Admit(conn))
            .map_err(|_| ReactorError::ShardClosed(idx))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        for shard in &self.shards {
            let _ = shard.control.send(ShardSignal::Shutdown);
        }
        for (id, shard) in self.shards.iter().enumerate() {
            let thread = shard.thread.lock().ok().and_then(|mut t| t.take());
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    tracing::error!(shard = id, "event loop thread panicked");
                }
            }
        }
    }
}

impl Drop for EventLoopPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ShardWorker {
    id: usize,
    control: mpsc::UnboundedReceiver<ShardSignal>,
    output: RequestSender,
    registry: Arc<ConnectionRegistry>,
    read_buffer: usize,
}

impl ShardWorker {
    async fn run(mut self) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                signal = self.control.recv() => match signal {
                    Some(ShardSignal::Admit(conn)) => self.admit(conn, &mut tasks),
                    Some(ShardSignal::Shutdown) | None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(shard = self.id, "connection task panicked");
                        }
                    }
                }
            }
        }

        // Aborting the tasks drops every in-flight push; nothing reaches the
        // queue once this returns.
        tasks.shutdown().await;
        self.control.close();
        while let Ok(signal) = self.control.try_recv() {
            if let ShardSignal::Admit(conn) = signal {
                conn.close();
            }
        }
        tracing::debug!(shard = self.id, "event loop stopped");
    }

    fn admit(&self, conn: Arc<Connection>, tasks: &mut JoinSet<()>) {
        let Some(io) = conn.take_io() else {
            tracing::debug!(shard = self.id, conn_id = %conn.id(), "connection closed before admission");
            return;
        };

        let stream = io
            .stream
            .set_nonblocking(true)
            .and_then(|()| TcpStream::from_std(io.stream));
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(shard = self.id, conn_id = %conn.id(), error = %e, "failed to register connection");
                conn.close();
                self.registry.remove(conn.id());
                return;
            }
        };

        tasks.spawn(serve(ConnTask {
            shard: self.id,
            conn,
            stream,
            outbound: io.outbound,
            output: self.output.clone(),
            registry: Arc::clone(&self.registry),
            read_buffer: self.read_buffer,
        }));
    }
}

enum CloseReason {
    Local,
    PeerClosed,
    Io(std::io::Error),
    Protocol(CodecError),
    QueueClosed,
}

struct ConnTask {
    shard: usize,
    conn: Arc<Connection>,
    stream: TcpStream,
    outbound: mpsc::Receiver<bytes::Bytes>,
    output: RequestSender,
    registry: Arc<ConnectionRegistry>,
    read_buffer: usize,
}

async fn serve(task: ConnTask) {
    let ConnTask {
        shard,
        conn,
        stream,
        mut outbound,
        output,
        registry,
        read_buffer,
    } = task;

    let (mut reader, mut writer) = stream.into_split();
    let mut closed = conn.closed_signal();
    let mut buf = BytesMut::with_capacity(read_buffer);

    let reason = loop {
        if *closed.borrow_and_update() {
            break CloseReason::Local;
        }
        buf.reserve(read_buffer);
        tokio::select! {
            _ = closed.changed() => break CloseReason::Local,
            outgoing = outbound.recv() => match outgoing {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        break CloseReason::Io(e);
                    }
                }
                None => break CloseReason::Local,
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break CloseReason::PeerClosed,
                Ok(_) => {
                    if let Err(reason) = forward_frames(&conn, &mut buf, &output).await {
                        break reason;
                    }
                }
                Err(e) => break CloseReason::Io(e),
            },
        }
    };

    conn.close();
    let total = registry.remove(conn.id()).map(|_| registry.count());

    match reason {
        CloseReason::Local => {
            tracing::debug!(shard, conn_id = %conn.id(), "connection closed locally");
        }
        CloseReason::PeerClosed => {
            tracing::info!(shard, conn_id = %conn.id(), address = %conn.peer_addr(), conn_total = ?total, "connection closed by peer");
        }
        CloseReason::Io(e) => {
            tracing::warn!(shard, conn_id = %conn.id(), error = %e, "connection i/o error");
        }
        CloseReason::Protocol(e) => {
            tracing::warn!(shard, conn_id = %conn.id(), error = %e, "protocol error, closing connection");
        }
        CloseReason::QueueClosed => {
            tracing::error!(shard, conn_id = %conn.id(), "request queue closed while event loop still running");
            debug_assert!(false, "request queue closed before the event loops stopped");
        }
    }
}

/// Decodes every complete frame in `buf` and pushes it, waiting whenever the
/// queue is full.
async fn forward_frames(conn: &Arc<Connection>, buf: &mut BytesMut, output: &RequestSender) -> Result<(), CloseReason> {
    while let Some(frame) = conn.codec().decode(buf).map_err(CloseReason::Protocol)? {
        output
            .push(Request::new(frame, conn))
            .await
            .map_err(|_| CloseReason::QueueClosed)?;
    }
    Ok(())
}
