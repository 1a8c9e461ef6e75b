//! # filecast-server
//!
//! Real-time fan-out relay over WebSocket. Every `{content, fileExtension}`
//! message a client sends is rebroadcast to every connected client, sender
//! included.
//!
//! - `websocket`: connection registry, per-connection readers, the dispatch
//!   queue and the single broadcast loop
//! - HTTP surface: `/ws` upgrade, `/health`, `/metrics`, permissive CORS
//! - Graceful shutdown via a shared `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{RelayError, Result};
pub use message::FileMessage;
pub use server::RelayServer;
