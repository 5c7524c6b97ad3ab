//! MCP (Model Context Protocol) server
//!
//! JSON-RPC 2.0 over stdio exposing the recommender as tools.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::create_server;
