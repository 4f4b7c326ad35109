//! Handlers for the single-command catalog tools: `add_command`,
//! `remove_command`, `update_command`, `list_commands` and `get_command`.

use std::sync::Arc;

use rmcp::model::JsonObject;
use serde_json::json;
use tracing::info;

use crate::batch::{Mutation, apply_mutation};
use crate::state::AppState;
use crate::tools::{ToolFuture, ToolHandler, error_result, object_schema, str_arg, text_result};

/// Handler for the `add_command` tool.
pub struct AddCommandHandler {
    state: Arc<AppState>,
}

impl AddCommandHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for AddCommandHandler {
    fn name(&self) -> &str {
        "add_command"
    }

    fn description(&self) -> &str {
        "Register a new command as an MCP tool by wrapping an executable."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "name": {
                    "type": "string",
                    "description": "Unique command name (alphanumeric and underscores, must start with letter)"
                },
                "exec": {
                    "type": "string",
                    "description": "Path to executable (absolute, relative to cwd, or in $PATH)"
                },
                "args": {
                    "type": "object",
                    "description": "Argument specifications: {\"arg_name\": {\"type\": \"string|number|boolean\", \"description\": \"...\", \"required\": true}}"
                },
                "description": {
                    "type": "string",
                    "description": "Help text shown to agents"
                },
                "async": {
                    "type": "boolean",
                    "description": "Run in the background and return immediately (default: false)"
                },
                "timeout": {
                    "type": "string",
                    "description": "Timeout duration, e.g. '30s', '5m', '1h' (default: '120s')"
                }
            }),
            &["name", "exec"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let name = match apply_mutation(self.state.registry(), Mutation::Add, &args) {
                Ok(name) => name,
                Err(e) => return Ok(error_result(e.to_string())),
            };

            self.state.persist();
            info!(
                "Added command: {} -> {}",
                name,
                str_arg(&args, "exec").unwrap_or_default()
            );
            Ok(text_result(format!(
                "Command {:?} registered successfully. It is now available as an MCP tool.",
                name
            )))
        })
    }
}

/// Handler for the `remove_command` tool.
pub struct RemoveCommandHandler {
    state: Arc<AppState>,
}

impl RemoveCommandHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for RemoveCommandHandler {
    fn name(&self) -> &str {
        "remove_command"
    }

    fn description(&self) -> &str {
        "Unregister a command by name."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "name": {"type": "string", "description": "Name of the command to remove"}
            }),
            &["name"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let name = match apply_mutation(self.state.registry(), Mutation::Remove, &args) {
                Ok(name) => name,
                Err(e) => return Ok(error_result(e.to_string())),
            };

            self.state.persist();
            info!("Removed command: {}", name);
            Ok(text_result(format!("Command {:?} removed.", name)))
        })
    }
}

/// Handler for the `update_command` tool.
pub struct UpdateCommandHandler {
    state: Arc<AppState>,
}

impl UpdateCommandHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for UpdateCommandHandler {
    fn name(&self) -> &str {
        "update_command"
    }

    fn description(&self) -> &str {
        "Update an existing registered command. Provide name of command to update plus any fields to change."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "name": {"type": "string", "description": "Name of the command to update"},
                "new_name": {"type": "string", "description": "Rename the command"},
                "exec": {"type": "string", "description": "New executable path"},
                "args": {
                    "type": "object",
                    "description": "New argument specifications (replaces existing args)"
                },
                "description": {"type": "string", "description": "New help text"},
                "async": {"type": "boolean", "description": "New async setting"},
                "timeout": {"type": "string", "description": "New timeout duration"}
            }),
            &["name"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let updated = match apply_mutation(self.state.registry(), Mutation::Update, &args) {
                Ok(updated) => updated,
                Err(e) => return Ok(error_result(e.to_string())),
            };

            self.state.persist();
            let name = str_arg(&args, "name").unwrap_or_default();
            if updated != name {
                info!("Updated command: {} (renamed to {})", name, updated);
            } else {
                info!("Updated command: {}", name);
            }
            Ok(text_result(format!("Command {:?} updated.", name)))
        })
    }
}

/// Handler for the `list_commands` tool.
pub struct ListCommandsHandler {
    state: Arc<AppState>,
}

impl ListCommandsHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for ListCommandsHandler {
    fn name(&self) -> &str {
        "list_commands"
    }

    fn description(&self) -> &str {
        "List all registered commands with their descriptions."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(json!({}), &[])
    }

    fn execute(&self, _args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let commands = self.state.visible_commands();
            if commands.is_empty() {
                return Ok(text_result(
                    "No commands registered. Use add_command to register one.",
                ));
            }
            Ok(text_result(serde_json::to_string_pretty(&commands)?))
        })
    }
}

/// Handler for the `get_command` tool.
pub struct GetCommandHandler {
    state: Arc<AppState>,
}

impl GetCommandHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for GetCommandHandler {
    fn name(&self) -> &str {
        "get_command"
    }

    fn description(&self) -> &str {
        "Get full details of a registered command."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "name": {"type": "string", "description": "Name of the command to inspect"}
            }),
            &["name"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(name) = str_arg(&args, "name") else {
                return Ok(error_result("name is required"));
            };

            match self.state.lookup(name) {
                Ok(def) => Ok(text_result(serde_json::to_string_pretty(&def)?)),
                Err(e) => Ok(error_result(e.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{CatalogStore, JsonFileStore};
    use crate::tools::test_support::{args, is_error, temp_state, text_of};
    use serde_json::Value;

    #[tokio::test]
    async fn test_add_registers_and_persists() {
        let (dir, state) = temp_state();
        let handler = AddCommandHandler::new(state.clone());

        let result = handler
            .execute(args(json!({
                "name": "greet",
                "exec": "/bin/echo",
                "args": {"who": {"type": "string", "required": true}}
            })))
            .await
            .unwrap();

        assert!(!is_error(&result));
        assert_eq!(
            text_of(&result),
            "Command \"greet\" registered successfully. It is now available as an MCP tool."
        );
        assert_eq!(state.registry().get("greet").unwrap().timeout.as_deref(), Some("120s"));

        let saved = JsonFileStore::new(dir.path().join("state.json")).load().unwrap();
        assert!(saved.contains_key("greet"));
    }

    #[tokio::test]
    async fn test_add_duplicate_suggests_update() {
        let (_dir, state) = temp_state();
        let handler = AddCommandHandler::new(state);
        let def = json!({"name": "dup", "exec": "/bin/echo"});

        handler.execute(args(def.clone())).await.unwrap();
        let result = handler.execute(args(def)).await.unwrap();

        assert!(is_error(&result));
        assert_eq!(
            text_of(&result),
            "command \"dup\" already exists, use update to modify it"
        );
    }

    #[tokio::test]
    async fn test_add_invalid_definition_is_tool_error() {
        let (_dir, state) = temp_state();
        let handler = AddCommandHandler::new(state.clone());

        for bad in [
            json!({"name": "1bad", "exec": "/bin/echo"}),
            json!({"name": "ok", "exec": "/bin/echo", "timeout": "soon"}),
            json!({"name": "ok", "exec": "/bin/echo", "args": {"x": {"type": "list"}}}),
            json!({"name": "help", "exec": "/bin/echo"}),
        ] {
            let result = handler.execute(args(bad)).await.unwrap();
            assert!(is_error(&result));
        }
        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, state) = temp_state();
        AddCommandHandler::new(state.clone())
            .execute(args(json!({"name": "gone", "exec": "/bin/echo"})))
            .await
            .unwrap();

        let handler = RemoveCommandHandler::new(state.clone());
        let result = handler.execute(args(json!({"name": "gone"}))).await.unwrap();
        assert_eq!(text_of(&result), "Command \"gone\" removed.");
        assert!(state.registry().is_empty());

        let result = handler.execute(args(json!({"name": "gone"}))).await.unwrap();
        assert!(is_error(&result));
        assert_eq!(text_of(&result), "command \"gone\" not found");

        let result = handler.execute(JsonObject::new()).await.unwrap();
        assert_eq!(text_of(&result), "name is required");
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (_dir, state) = temp_state();
        AddCommandHandler::new(state.clone())
            .execute(args(json!({
                "name": "build",
                "exec": "/bin/echo",
                "description": "Build it",
                "args": {"target": {"type": "string"}}
            })))
            .await
            .unwrap();

        let handler = UpdateCommandHandler::new(state.clone());
        let result = handler
            .execute(args(json!({"name": "build", "timeout": "10m"})))
            .await
            .unwrap();
        assert_eq!(text_of(&result), "Command \"build\" updated.");

        let def = state.registry().get("build").unwrap();
        assert_eq!(def.description, "Build it");
        assert_eq!(def.timeout.as_deref(), Some("10m"));
        assert!(def.args.contains_key("target"));

        let result = handler
            .execute(args(json!({"name": "build", "new_name": "compile"})))
            .await
            .unwrap();
        assert!(!is_error(&result));
        assert!(state.registry().get("compile").is_ok());
        assert!(state.registry().get("build").is_err());
    }

    #[tokio::test]
    async fn test_update_rejects_bad_timeout_and_keeps_entry() {
        let (_dir, state) = temp_state();
        AddCommandHandler::new(state.clone())
            .execute(args(json!({"name": "keep", "exec": "/bin/echo", "timeout": "5s"})))
            .await
            .unwrap();

        let result = UpdateCommandHandler::new(state.clone())
            .execute(args(json!({"name": "keep", "timeout": "later"})))
            .await
            .unwrap();
        assert!(is_error(&result));
        assert_eq!(state.registry().get("keep").unwrap().timeout.as_deref(), Some("5s"));
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let (_dir, state) = temp_state();
        let list = ListCommandsHandler::new(state.clone());

        let result = list.execute(JsonObject::new()).await.unwrap();
        assert_eq!(
            text_of(&result),
            "No commands registered. Use add_command to register one."
        );

        for name in ["zeta", "alpha"] {
            AddCommandHandler::new(state.clone())
                .execute(args(json!({"name": name, "exec": "/bin/echo"})))
                .await
                .unwrap();
        }

        let listed: Value = serde_json::from_str(&text_of(&list.execute(JsonObject::new()).await.unwrap())).unwrap();
        assert_eq!(listed[0]["name"], "alpha");
        assert_eq!(listed[1]["name"], "zeta");

        let get = GetCommandHandler::new(state);
        let one: Value = serde_json::from_str(&text_of(
            &get.execute(args(json!({"name": "zeta"}))).await.unwrap(),
        ))
        .unwrap();
        assert_eq!(one["exec"], "/bin/echo");
        assert_eq!(one["timeout"], "120s");

        let missing = get.execute(args(json!({"name": "nope"}))).await.unwrap();
        assert!(is_error(&missing));
    }
}
