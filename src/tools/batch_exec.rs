//! Handler for the `batch_exec` tool.

use std::sync::Arc;

use rmcp::model::JsonObject;
use serde_json::{Value, json};

use crate::batch::{BatchCoordinator, BatchMode, BatchOp};
use crate::state::AppState;
use crate::tools::{ToolFuture, ToolHandler, error_result, object_schema, text_result};

/// Handler for the `batch_exec` tool.
pub struct BatchExecHandler {
    state: Arc<AppState>,
}

impl BatchExecHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Validate the `commands` array before anything is applied.
    fn parse_ops(args: &JsonObject) -> Result<Vec<BatchOp>, String> {
        let raw = args
            .get("commands")
            .and_then(Value::as_array)
            .filter(|ops| !ops.is_empty())
            .ok_or_else(|| "commands must be a non-empty array".to_string())?;

        raw.iter()
            .enumerate()
            .map(|(i, entry)| {
                let obj = entry
                    .as_object()
                    .ok_or_else(|| format!("commands[{}] must be an object", i))?;
                let operation = obj
                    .get("operation")
                    .and_then(Value::as_str)
                    .filter(|op| !op.is_empty())
                    .ok_or_else(|| format!("commands[{}] missing operation", i))?;
                let params = obj
                    .get("params")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                Ok(BatchOp::new(operation, params))
            })
            .collect()
    }
}

impl ToolHandler for BatchExecHandler {
    fn name(&self) -> &str {
        "batch_exec"
    }

    fn description(&self) -> &str {
        "Execute multiple command operations atomically. Supports add_command, remove_command, and update_command operations in a single call."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "commands": {
                    "type": "array",
                    "description": "Array of operations: [{\"operation\": \"add_command\"|\"remove_command\"|\"update_command\", \"params\": {...}}]",
                    "items": {
                        "type": "object",
                        "properties": {
                            "operation": {
                                "type": "string",
                                "enum": ["add_command", "remove_command", "update_command"]
                            },
                            "params": {"type": "object"}
                        },
                        "required": ["operation", "params"]
                    }
                },
                "atomic": {
                    "type": "boolean",
                    "description": "If true (default), all operations succeed or all fail. If false, partial success is allowed."
                }
            }),
            &["commands"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let ops = match Self::parse_ops(&args) {
                Ok(ops) => ops,
                Err(msg) => return Ok(error_result(msg)),
            };
            let mode = match args.get("atomic").and_then(Value::as_bool) {
                Some(false) => BatchMode::Partial,
                _ => BatchMode::Atomic,
            };

            let report = BatchCoordinator::new(self.state.registry(), self.state.store())
                .run(&ops, mode);
            let body = serde_json::to_string_pretty(&report.to_json())?;

            if report.is_success() {
                Ok(text_result(body))
            } else {
                Ok(error_result(body))
            }
        })
    }
}
