// Core modules
mod config;
pub mod batch;
pub mod executor;
pub mod model;
pub mod persistence;
pub mod registry;
mod state;

// Protocol surface
pub mod mcp;
pub mod server;
pub mod tools;

// Re-export key types and functions
pub use batch::{BatchCoordinator, BatchMode, BatchOp, BatchReport, BatchResult};
pub use config::{ServerConfig, ensure_state_dir, resolve_state_path};
pub use model::{ArgSpec, ArgType, CommandDef};
pub use persistence::{CatalogStore, JsonFileStore};
pub use registry::{CommandRegistry, RegistryError};
pub use server::McpServer;
pub use state::AppState;
pub use tools::{BUILTIN_TOOL_NAMES, ToolHandler, ToolRegistry};

use std::sync::Arc;
use tracing::warn;

/// Convenience function to create a fully configured MCP server.
///
/// Loads the state file named by `config` (a failed load is logged and the
/// server starts empty), registers the built-in tools, and returns an
/// `McpServer` ready to `run`.
pub fn create_server(config: &ServerConfig) -> Arc<McpServer> {
    let store = Arc::new(JsonFileStore::new(config.state_path.clone()));
    let state = Arc::new(AppState::new(store));
    if let Err(e) = state.load() {
        warn!("Failed to load state: {:#}", e);
    }

    let tool_registry = Arc::new(tools::builtin_registry(state.clone()));
    Arc::new(McpServer::new(config, state, tool_registry))
}
