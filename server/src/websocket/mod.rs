//! Live waitlist updates over WebSocket.
//!
//! Each connection holds its own store subscription and receives the
//! subscriber count whenever the collection changes.

mod manager;
mod protocol;

pub use manager::ConnectionManager;
pub use protocol::*;
