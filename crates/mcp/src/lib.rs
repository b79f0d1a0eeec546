// MCP (Model Context Protocol) server over HTTP
// Serves the commerce tools to agent clients through unary JSON and SSE streams

pub mod error;
pub mod instance;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use error::{DiscoveryError, InstanceError};
pub use instance::{InstanceManager, McpInstance};
pub use server::ProtocolServer;
pub use transport::{TransportAdapter, TransportConfig, TransportMode};
