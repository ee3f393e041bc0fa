//! Listening-socket setup and the accept operation.

use crate::error::ServerError;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Source of accepted connections.
///
/// `Listener` is the production implementation; the accept loop is generic
/// over this trait so accept failures can be driven directly in tests.
pub trait AcceptSource {
    /// Waits for the next inbound connection.
    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), ServerError>> + Send;
}

/// Owns the listening endpoint.
///
/// Built through `TcpSocket` rather than `TcpListener::bind` so the accept
/// backlog is configurable and `SO_REUSEADDR` can be set before binding.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds the listening endpoint with the given backlog.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, ServerError> {
        let bind = |addr: SocketAddr, backlog: u32| -> std::io::Result<TcpListener> {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            // Not needed on Windows, where closed listeners release the port
            // immediately.
            #[cfg(not(windows))]
            socket.set_reuseaddr(true)?;
            socket.bind(addr)?;
            socket.listen(backlog)
        };

        let inner = bind(addr, backlog).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self { inner, local_addr })
    }

    /// Waits for the next inbound connection.
    ///
    /// An error here is the normal unwind signal when the endpoint is
    /// closed or becomes invalid; the accept loop treats it as a stop
    /// request rather than retrying.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.inner.accept().await.map_err(ServerError::Accept)
    }

    /// The address actually bound, resolved after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Releases the listening endpoint.
    pub fn close(self) {
        drop(self);
    }
}

impl AcceptSource for Listener {
    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), ServerError>> + Send {
        Listener::accept(self)
    }
}
