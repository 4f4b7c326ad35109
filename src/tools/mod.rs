//! Built-in MCP tools.
//!
//! Each tool is a `ToolHandler`; `builtin_registry` wires them all against
//! one shared `AppState` so the server can look them up by name.

mod registry;

pub use registry::{ToolFuture, ToolHandler, ToolRegistry};

// Tool handler implementations
mod batch_exec;
mod commands;
mod config_io;
mod help;

pub use batch_exec::BatchExecHandler;
pub use commands::{
    AddCommandHandler, GetCommandHandler, ListCommandsHandler, RemoveCommandHandler,
    UpdateCommandHandler,
};
pub use config_io::{DEFAULT_EXPORT_PATH, ExportConfigHandler, ImportConfigHandler};
pub use help::HelpHandler;

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::Value;

use crate::state::AppState;

/// Names of the built-in tools, in the order they are listed.
pub const BUILTIN_TOOL_NAMES: [&str; 9] = [
    "help",
    "add_command",
    "remove_command",
    "update_command",
    "list_commands",
    "get_command",
    "batch_exec",
    "import_config",
    "export_config",
];

/// Build the lookup table of every built-in tool.
pub fn builtin_registry(state: Arc<AppState>) -> ToolRegistry {
    ToolRegistry::new()
        .register_handler(HelpHandler)
        .register_handler(AddCommandHandler::new(state.clone()))
        .register_handler(RemoveCommandHandler::new(state.clone()))
        .register_handler(UpdateCommandHandler::new(state.clone()))
        .register_handler(ListCommandsHandler::new(state.clone()))
        .register_handler(GetCommandHandler::new(state.clone()))
        .register_handler(BatchExecHandler::new(state.clone()))
        .register_handler(ImportConfigHandler::new(state.clone()))
        .register_handler(ExportConfigHandler::new(state))
}

/// Successful tool result with a single text block.
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: None,
        meta: None,
    }
}

/// Failed tool result with a single text block.
pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

/// `{"type": "object", "properties": ..., "required": [...]}`
fn object_schema(properties: Value, required: &[&str]) -> JsonObject {
    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), Value::from("object"));
    schema.insert("properties".to_string(), properties);
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::from(required.to_vec()));
    }
    schema
}

/// Non-empty string argument.
fn str_arg<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
