//! The connection-handler contract consumed by the coordinator.

use std::net::SocketAddr;
use std::sync::Arc;

/// One autonomous unit handling a single accepted connection.
///
/// The coordinator depends only on this contract; the protocol spoken over
/// the connection is the handler's private business. Failures inside a
/// handler stay inside it and never reach the coordinator or other
/// handlers.
pub trait ConnectionHandler: Send + Sync {
    /// Unique handler id, for logging.
    fn id(&self) -> &str;

    /// Remote peer address.
    fn peer_addr(&self) -> SocketAddr;

    /// Begins autonomous execution on its own task. Must not block the
    /// caller; calling it more than once is a no-op.
    fn start(self: Arc<Self>);

    /// Requests termination. Non-blocking and latched: repeat calls are
    /// no-ops. When `notify_peer` is true the handler attempts one
    /// best-effort farewell line before closing. Must not re-enter the
    /// coordinator.
    fn stop(&self, notify_peer: bool);
}
