//! Plugin system for greeter
//!
//! Language providers that are not compiled into the host run as separate
//! processes. The host spawns them, speaks gRPC to them over their
//! stdin/stdout, and tears them down again on demand or at exit.
pub mod client;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod server;
pub mod stdio_transport;

// Re-export commonly used types
pub use client::RpcClient;
pub use error::PluginError;
pub use manager::{PluginKey, PluginManager};
