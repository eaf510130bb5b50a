use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::ServerError;
use crate::listener::{Listener, TcpAcceptor};
use crate::reactor::{EventLoopPool, Reactor};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tcpx_codec::DataPacker;
use tcpx_core::{
    request_queue, telemetry, ConnectionRegistry, FrameCodec, Handler, Lifecycle, LifecycleState, RequestSender,
    RouterTable, ServerBuilder, ServerConfig, TelemetryError,
};
use tokio::sync::{watch, Semaphore};

/// A TCP server: one listener, one reactor pool, one dispatch path.
///
/// ```ignore
/// let server = Arc::new(Server::bind("127.0.0.1:9000")?);
/// server.add_router(1, |req: &Request| -> Result<(), HandlerError> { req.reply(1, req.payload())?; Ok(()) });
/// server.start().await?;
/// ```
pub struct Server {
    local_addr: SocketAddr,
    lifecycle: Lifecycle,
    config: ServerConfig,
    packer: Arc<dyn FrameCodec>,
    listener: Mutex<Option<Box<dyn Listener>>>,
    reactor: Box<dyn Reactor>,
    registry: Arc<ConnectionRegistry>,
    router: Arc<RouterTable>,
    queue: Mutex<Option<RequestSender>>,
    dispatcher: Dispatcher,
    shutdown: watch::Sender<bool>,
    admission: Option<Arc<Semaphore>>,
}

impl Server {
    /// Binds `addr` with default options.
    pub fn bind(addr: &str) -> Result<Self, ServerError> {
        Self::from_builder(ServerBuilder::new(), addr)
    }

    /// Binds the address named by `config.host` and `config.port`.
    pub fn from_config(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        Self::from_builder(ServerBuilder::new().with_config(config), &addr)
    }

    pub fn from_builder(builder: ServerBuilder, addr: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(addr.to_string()))?;
        builder.config.validate()?;

        let listener = TcpAcceptor::bind(addr, &builder.config).map_err(ServerError::Bind)?;
        let reactor = EventLoopPool::new(builder.config.resolved_event_loops(), builder.config.read_buffer);
        Self::from_parts(builder, Box::new(listener), Box::new(reactor))
    }

    /// Assembles a server from a custom listener and reactor.
    ///
    /// Starts the reactor shards and the dispatch path; any failure here aborts
    /// construction instead of producing a degraded server.
    pub fn from_parts(
        builder: ServerBuilder,
        listener: Box<dyn Listener>,
        mut reactor: Box<dyn Reactor>,
    ) -> Result<Self, ServerError> {
        let ServerBuilder { config, router, packer } = builder;
        config.validate()?;

        if let Some(output) = &config.log_output {
            match telemetry::init(output, &config.log_level) {
                Ok(()) => {}
                Err(TelemetryError::AlreadyInstalled) => {
                    tracing::debug!("global subscriber already installed, keeping it");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let packer = packer.unwrap_or_else(|| Arc::new(DataPacker::new(config.max_frame_len)));
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(router);
        let (queue_tx, queue_rx) = request_queue(config.queue_capacity);

        reactor.init(Arc::clone(&registry))?;
        reactor.start(queue_tx.clone())?;

        let dispatcher = match Dispatcher::spawn(queue_rx, Arc::clone(&router), config.dispatch_lanes, config.queue_capacity) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                reactor.stop();
                return Err(ServerError::Dispatcher(e));
            }
        };

        let (shutdown, _) = watch::channel(false);
        let admission = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));

        Ok(Self {
            local_addr: listener.local_addr(),
            lifecycle: Lifecycle::new(),
            config,
            packer,
            listener: Mutex::new(Some(listener)),
            reactor,
            registry,
            router,
            queue: Mutex::new(Some(queue_tx)),
            dispatcher,
            shutdown,
            admission,
        })
    }

    /// Registers a handler for `msg_id`, replacing any previous one.
    pub fn add_router(&self, msg_id: u32, handler: impl Handler) {
        self.router.add(msg_id, handler);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<RouterTable> {
        &self.router
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Runs the accept loop until [`Server::stop`] is called.
    ///
    /// A no-op returning `Ok(())` unless the server is `Stopped`, so a repeated
    /// call never spawns a second accept loop. A server that has been stopped
    /// cannot be started again.
    pub async fn start(&self) -> Result<(), ServerError> {
        if !self.lifecycle.try_start() {
            if self.lifecycle.is_sealed() {
                return Err(ServerError::ShutDown);
            }
            return Ok(());
        }

        let listener = self.listener.lock().ok().and_then(|mut l| l.take());
        let Some(mut listener) = listener else {
            return Err(ServerError::ListenerUnavailable);
        };

        tracing::info!(ip = %self.local_addr.ip(), port = self.local_addr.port(), "server started");
        self.accept_loop(listener.as_mut()).await;
        tracing::info!(addr = %self.local_addr, "accept loop exited");
        Ok(())
    }

    /// Blocks the calling thread on [`Server::start`] using a private runtime.
    pub fn start_blocking(&self) -> Result<(), ServerError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        rt.block_on(self.start())
    }

    async fn accept_loop(&self, listener: &mut dyn Listener) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let accepted = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = listener.accept(&self.packer) => accepted,
            };

            let conn = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "socket accept error");
                    continue;
                }
            };

            if let Some(admission) = &self.admission {
                match Arc::clone(admission).try_acquire_owned() {
                    Ok(permit) => conn.hold_permit(permit),
                    Err(_) => {
                        tracing::warn!(
                            address = %conn.peer_addr(),
                            max_connections = ?self.config.max_connections,
                            "connection limit reached, rejecting"
                        );
                        conn.close();
                        continue;
                    }
                }
            }

            if let Err(e) = self.reactor.add_read(Arc::clone(&conn)) {
                tracing::warn!(conn_id = %conn.id(), error = %e, "event loop rejected connection");
                conn.close();
                continue;
            }

            let Some(total) = self.registry.add(Arc::clone(&conn)) else {
                tracing::debug!(conn_id = %conn.id(), "connection closed before registration");
                continue;
            };
            tracing::info!(
                conn_id = %conn.id(),
                address = %conn.peer_addr(),
                conn_total = total,
                "new connect"
            );
        }
    }

    /// Shuts the server down.
    ///
    /// Order: mark `Stopping`, halt the reactor, close every connection, close
    /// the request queue, wait for the dispatch path to drain, mark `Stopped`.
    /// The queue must only close after the reactor has stopped producing.
    ///
    /// Idempotent. Blocks while shard threads and the dispatch path are joined;
    /// from async code prefer calling it via `spawn_blocking`.
    pub fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            tracing::debug!("stop called on a server that is already shut down");
            return;
        }

        self.shutdown.send_replace(true);

        self.reactor.stop();

        let closed = self.registry.clear_all();

        if let Some(queue) = self.queue.lock().ok().and_then(|mut q| q.take()) {
            queue.close();
        }

        if !self.dispatcher.join() {
            tracing::debug!("stop issued from the dispatch path, not waiting for drain");
        }

        self.lifecycle.finish_stop();
        tracing::info!(addr = %self.local_addr, closed, "server stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifecycle.is_sealed()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
