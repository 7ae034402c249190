//! Transport layer: newline-delimited JSON over stdio, or WebSocket over HTTP.

pub mod framing;
pub mod stdio;
#[cfg(feature = "http")]
pub mod ws;

pub use stdio::StdioTransport;
#[cfg(feature = "http")]
pub use ws::HttpTransport;
