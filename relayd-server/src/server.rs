//! Connection-lifecycle coordinator: accept loop and shutdown sequencing.

use crate::error::ServerError;
use crate::handler::ConnectionHandler;
use crate::listener::{AcceptSource, Listener};
use crate::registry::HandlerRegistry;
use crate::session::SessionHandler;
use relayd_storage::MessageStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Accept backlog for the listening socket.
    pub accept_backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7301".parse().unwrap(),
            accept_backlog: 128,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the accept backlog.
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.accept_backlog = backlog;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
}

/// Stop latch states. Request and notify flag live in one atomic so an
/// observer that sees a stop requested always sees the latched flag too.
const STOP_UNSET: u8 = 0;
const STOP_SILENT: u8 = 1;
const STOP_NOTIFY: u8 = 2;

/// TCP server for relayd.
///
/// Lifecycle is `Idle -> Running -> Stopping -> Stopped`, one run per
/// instance; a stopped server does not re-enter the accept loop.
pub struct Server {
    config: ServerConfig,
    store: Arc<MessageStore>,
    registry: Arc<HandlerRegistry>,
    stats: Arc<ServerStats>,

    /// Wakes the accept loop when a stop is requested.
    shutdown: broadcast::Sender<()>,

    running: AtomicBool,

    /// Latched stop request, written once by the first `stop` caller.
    stop_state: AtomicU8,

    /// Bound address, published once `run` has bound the listener.
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, store: Arc<MessageStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            store,
            registry: Arc::new(HandlerRegistry::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            stop_state: AtomicU8::new(STOP_UNSET),
            local_addr: OnceLock::new(),
        }
    }

    /// Runs the server until a stop is requested or accept fails.
    ///
    /// Ensures the storage schema, binds the listener, then accepts
    /// connections, wrapping each in a `SessionHandler` that is registered
    /// and started. On exit from the loop every registered handler gets
    /// exactly one `stop` call carrying the latched notify flag. Handler
    /// teardown is not awaited; the sweep is complete once every `stop`
    /// call has returned.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Schema failures are fatal before any connection is accepted.
        self.store.ensure_schema()?;

        let listener = Listener::bind(self.config.bind_addr, self.config.accept_backlog)?;
        let _ = self.local_addr.set(listener.local_addr());
        tracing::info!("Server listening on {}", listener.local_addr());

        self.run_with(listener).await
    }

    /// Drives the accept loop against any connection source, then performs
    /// the shutdown sweep.
    async fn run_with<A: AcceptSource>(&self, listener: A) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        loop {
            // Checked before the first accept as well, so a stop requested
            // before `run` yields zero accepts.
            if self.stop_requested() {
                break;
            }

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::info!("New client connection from {}", addr);
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);

                            let handler = SessionHandler::new(
                                stream,
                                addr,
                                Arc::downgrade(&self.registry),
                                self.store.clone(),
                            );
                            self.registry.register(handler.clone());
                            handler.start();
                        }
                        Err(e) => {
                            // Expected when the endpoint is closed during
                            // shutdown; either way the loop stops, there is
                            // no retry policy for the listening socket.
                            if self.stop_requested() {
                                tracing::debug!("Accept unblocked by shutdown: {}", e);
                            } else {
                                tracing::warn!("Accept failed, stopping server: {}", e);
                            }
                            self.stop(true);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);

        // Release the listening endpoint before stopping handlers.
        drop(listener);

        tracing::info!("Stopping server");
        let notify = self.latched_notify();
        let stopped = self.registry.stop_all(notify);
        tracing::info!("Stopped {} handler(s) (notify_peer={})", stopped, notify);

        Ok(())
    }

    /// Requests a stop. Callable from any task.
    ///
    /// The first call latches `notify_peer` for the shutdown sweep in a
    /// single compare-exchange; later calls are no-ops and cannot
    /// overwrite the flag.
    pub fn stop(&self, notify_peer: bool) {
        let state = if notify_peer { STOP_NOTIFY } else { STOP_SILENT };
        if self
            .stop_state
            .compare_exchange(STOP_UNSET, state, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let _ = self.shutdown.send(());
    }

    fn stop_requested(&self) -> bool {
        self.stop_state.load(Ordering::SeqCst) != STOP_UNSET
    }

    /// The notify flag recorded by the latching `stop` call. Defaults to
    /// notify when no explicit silent stop was latched.
    fn latched_notify(&self) -> bool {
        self.stop_state.load(Ordering::SeqCst) != STOP_SILENT
    }

    /// Returns whether the accept loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound address, available once `run` has bound the listener.
    /// Useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
