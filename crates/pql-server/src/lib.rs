//! PQL server — interactive query sessions over stdio and WebSocket.

pub mod config;
pub mod protocol;
pub mod repl;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{resolve_registry_path, Backend, ServerConfig};
pub use protocol::ProtocolHandler;
pub use session::SessionManager;
pub use transport::StdioTransport;
