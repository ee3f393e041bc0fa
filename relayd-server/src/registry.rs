//! Registry of live connection handlers, used for shutdown fan-out.

use crate::handler::ConnectionHandler;
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered set of currently tracked handlers.
///
/// Handlers are appended at accept time and never pruned during a run;
/// finished handlers keep their slot until the process shuts down, so the
/// registry grows monotonically for the lifetime of one run. Stopping a
/// handler that already finished is a no-op by the handler contract.
///
/// Registration happens on the accept-loop task while `stop_all` may run
/// after a stop triggered from another task (signal handler), so access
/// goes through a mutex.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<Vec<Arc<dyn ConnectionHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Never rejects; capacity control is deferred to
    /// the accept backlog.
    pub fn register(&self, handler: Arc<dyn ConnectionHandler>) {
        self.handlers.lock().push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Applies `f` to every handler, in registration order.
    ///
    /// Handlers are cloned out before iterating so the lock is not held
    /// across the callback.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<dyn ConnectionHandler>)) {
        let handlers: Vec<_> = self.handlers.lock().iter().cloned().collect();
        for handler in &handlers {
            f(handler);
        }
    }

    /// Issues exactly one `stop(notify_peer)` per handler, in registration
    /// order. Returns the number of handlers notified.
    pub fn stop_all(&self, notify_peer: bool) -> usize {
        let mut stopped = 0;
        self.for_each(|handler| {
            tracing::debug!("Stopping handler {} ({})", handler.id(), handler.peer_addr());
            handler.stop(notify_peer);
            stopped += 1;
        });
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        id: String,
        starts: AtomicUsize,
        stops: Mutex<Vec<bool>>,
    }

    impl RecordingHandler {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                starts: AtomicUsize::new(0),
                stops: Mutex::new(Vec::new()),
            })
        }
    }

    impl ConnectionHandler for RecordingHandler {
        fn id(&self) -> &str {
            &self.id
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:9999".parse().unwrap()
        }

        fn start(self: Arc<Self>) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self, notify_peer: bool) {
            self.stops.lock().push(notify_peer);
        }
    }

    #[test]
    fn test_register_and_len() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        registry.register(RecordingHandler::new("a"));
        registry.register(RecordingHandler::new("b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_stop_all_visits_each_once_in_order() {
        let registry = HandlerRegistry::new();
        let handlers: Vec<_> = (0..3)
            .map(|i| {
                let h = RecordingHandler::new(&format!("h{}", i));
                registry.register(h.clone());
                h
            })
            .collect();

        let mut seen = Vec::new();
        registry.for_each(|h| seen.push(h.id().to_string()));
        assert_eq!(seen, vec!["h0", "h1", "h2"]);

        assert_eq!(registry.stop_all(true), 3);
        for h in &handlers {
            assert_eq!(*h.stops.lock(), vec![true]);
        }
    }

    #[test]
    fn test_stop_all_empty() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.stop_all(false), 0);
    }

    #[test]
    fn test_stop_all_carries_flag() {
        let registry = HandlerRegistry::new();
        let h = RecordingHandler::new("h");
        registry.register(h.clone());

        registry.stop_all(false);
        assert_eq!(*h.stops.lock(), vec![false]);
    }
}
