//! Handler for the `help` tool.

use rmcp::model::JsonObject;
use serde_json::json;

use crate::tools::{ToolFuture, ToolHandler, object_schema, text_result};

const USAGE_GUIDE: &str = r#"# instant-mcp Usage Guide

instant-mcp lets you register executables as MCP tools at runtime.

## Quick Start

1. Add a command:
   add_command(name: "greet", exec: "./scripts/greet.sh", args: {"name": {"type": "string", "required": true}}, description: "Greet someone")

2. The command immediately appears as an MCP tool.

3. Call it: greet(name: "world")

## Tools

- add_command     - Register a new command
- remove_command  - Unregister a command
- update_command  - Modify an existing command (new_name renames it)
- list_commands   - Show all registered commands
- get_command     - Show command details
- batch_exec      - Multiple operations, atomic by default
- import_config   - Bulk import from YAML/JSON file
- export_config   - Export commands to YAML for version control
- help            - This guide

## Batch Setup

Register multiple commands in one call:
  batch_exec(commands: [
    {"operation": "add_command", "params": {"name": "lint", "exec": "./scripts/lint.sh"}},
    {"operation": "add_command", "params": {"name": "test", "exec": "./scripts/test.sh"}}
  ], atomic: true)

## Argument Types

- "string"  - Text input
- "number"  - Numeric input
- "boolean" - true/false

Arguments are passed to the executable as positional values, ordered by
argument name.

## Timeouts

Set per-command: "30s", "5m", "1h". Default: 120s.

## Background Commands

Commands registered with async: true return immediately; their output is
written to the server log.

## Version Control

Export: export_config(path: ".instant-mcp/commands.yaml")
Import: import_config(path: ".instant-mcp/commands.yaml")

## Security

Commands run with the server's permissions. Only register trusted executables."#;

/// Handler for the `help` tool.
pub struct HelpHandler;

impl ToolHandler for HelpHandler {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "Get usage guide for instant-mcp. Call this first to learn how to register and use dynamic commands."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(json!({}), &[])
    }

    fn execute(&self, _args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move { Ok(text_result(USAGE_GUIDE)) })
    }
}
