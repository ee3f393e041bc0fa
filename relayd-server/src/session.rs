//! Line-oriented session handler for one accepted connection.

use crate::handler::ConnectionHandler;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use relayd_storage::MessageStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Farewell line written to the peer when stopping with notify.
const FAREWELL: &[u8] = b"QUIT\n";

/// Session protocol: `PING` answers `PONG`, `WHO` answers `PEERS <n>`,
/// `QUIT` answers `BYE` and closes, any other non-empty line is persisted
/// to the message store and acknowledged with `OK <seq>`.
pub struct SessionHandler {
    id: String,
    peer_addr: SocketAddr,

    /// Connection, taken by `start`.
    stream: Mutex<Option<TcpStream>>,

    /// Stop delivery into the session task.
    stop_tx: mpsc::Sender<bool>,
    stop_rx: Mutex<Option<mpsc::Receiver<bool>>>,
    stopped: AtomicBool,

    /// Back-reference for peer enumeration; weak to avoid a cycle with the
    /// registry, which owns this handler.
    registry: Weak<HandlerRegistry>,

    store: Arc<MessageStore>,
}

impl SessionHandler {
    /// Wraps an accepted connection.
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        registry: Weak<HandlerRegistry>,
        store: Arc<MessageStore>,
    ) -> Arc<Self> {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            peer_addr,
            stream: Mutex::new(Some(stream)),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            stopped: AtomicBool::new(false),
            registry,
            store,
        })
    }

    async fn run_loop(self: Arc<Self>, stream: TcpStream, mut stop_rx: mpsc::Receiver<bool>) {
        let peer = self.peer_addr;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                biased;

                notify = stop_rx.recv() => {
                    if notify.unwrap_or(false) {
                        // Best-effort farewell; the peer may already be gone.
                        let _ = write_half.write_all(FAREWELL).await;
                    }
                    tracing::debug!("[{}] Session stopped", peer);
                    break;
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            match self.handle_line(line.trim(), &mut write_half).await {
                                Ok(true) => {}
                                Ok(false) => {
                                    tracing::debug!("[{}] Session closed by request", peer);
                                    break;
                                }
                                Err(e) => {
                                    tracing::debug!("[{}] Write error: {}", peer, e);
                                    break;
                                }
                            }
                        }
                        Ok(None) => {
                            tracing::debug!("[{}] Connection closed by peer", peer);
                            break;
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", peer, e);
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Session {} ended ({})", self.id, peer);
    }

    /// Handles one input line. Returns Ok(false) when the session should
    /// close.
    async fn handle_line(
        &self,
        line: &str,
        out: &mut OwnedWriteHalf,
    ) -> Result<bool, std::io::Error> {
        if line.is_empty() {
            return Ok(true);
        }

        match line {
            "PING" => {
                out.write_all(b"PONG\n").await?;
            }
            "WHO" => {
                let peers = self.registry.upgrade().map(|r| r.len()).unwrap_or(0);
                out.write_all(format!("PEERS {}\n", peers).as_bytes()).await?;
            }
            "QUIT" => {
                out.write_all(b"BYE\n").await?;
                return Ok(false);
            }
            text => match self.store.append(&self.peer_addr.to_string(), text) {
                Ok(seq) => {
                    out.write_all(format!("OK {}\n", seq).as_bytes()).await?;
                }
                Err(e) => {
                    tracing::warn!("[{}] Failed to persist message: {}", self.peer_addr, e);
                    out.write_all(b"ERR storage\n").await?;
                }
            },
        }

        Ok(true)
    }
}

impl ConnectionHandler for SessionHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn start(self: Arc<Self>) {
        let stream = self.stream.lock().take();
        let stop_rx = self.stop_rx.lock().take();
        if let (Some(stream), Some(stop_rx)) = (stream, stop_rx) {
            let handler = self.clone();
            tokio::spawn(async move {
                handler.run_loop(stream, stop_rx).await;
            });
        }
    }

    fn stop(&self, notify_peer: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // The session task may already have exited; a closed channel is fine.
        let _ = self.stop_tx.try_send(notify_peer);
    }
}
