//! WebSocket edge: the authenticated upgrade handler and the per-connection
//! read/write tasks.

pub mod connection;
pub mod handler;
