//! # relayd-server
//!
//! TCP server for relayd.
//!
//! This crate provides:
//! - Listening-socket setup with a bounded accept backlog
//! - The accept loop and per-connection task spawning
//! - A registry of live connection handlers for shutdown fan-out
//! - The stop/shutdown protocol (latched notify-peer flag, broadcast wakeup)
//! - A minimal line-oriented session handler

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{Config, NetworkConfig, StorageConfig};
pub use error::ServerError;
pub use handler::ConnectionHandler;
pub use listener::{AcceptSource, Listener};
pub use registry::HandlerRegistry;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::SessionHandler;
