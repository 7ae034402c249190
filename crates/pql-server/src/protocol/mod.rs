//! PQL wire protocol handling.

pub mod handler;
pub mod meta;

pub use handler::{Connection, OnDisconnect, Outbound, ProtocolHandler};
