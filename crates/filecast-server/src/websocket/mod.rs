//! WebSocket relay core: connection handles, the registry, the dispatch
//! queue, per-connection readers and the broadcast loop.

pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod reader;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
