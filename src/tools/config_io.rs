//! Handlers for `import_config` and `export_config`: bulk transfer of command
//! definitions through a YAML (or JSON) file that can live in version control.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rmcp::model::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::model::CommandDef;
use crate::state::AppState;
use crate::tools::{ToolFuture, ToolHandler, error_result, object_schema, str_arg, text_result};

/// Export target used when no `path` is given.
pub const DEFAULT_EXPORT_PATH: &str = ".instant-mcp/commands.yaml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandsFile {
    #[serde(default)]
    commands: BTreeMap<String, CommandDef>,
}

impl CommandsFile {
    /// YAML first, then JSON.
    fn parse(data: &str) -> Option<Self> {
        serde_yaml::from_str(data)
            .ok()
            .or_else(|| serde_json::from_str(data).ok())
    }
}

/// Handler for the `import_config` tool.
pub struct ImportConfigHandler {
    state: Arc<AppState>,
}

impl ImportConfigHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for ImportConfigHandler {
    fn name(&self) -> &str {
        "import_config"
    }

    fn description(&self) -> &str {
        "Bulk import commands from a YAML or JSON file. Existing commands with the same name are skipped unless overwrite is true."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "path": {
                    "type": "string",
                    "description": "Path to YAML or JSON file containing commands"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "If true, overwrite existing commands with same name (default: false)"
                }
            }),
            &["path"],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(path) = str_arg(&args, "path") else {
                return Ok(error_result("path is required"));
            };
            let overwrite = args
                .get("overwrite")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let data = match tokio::fs::read_to_string(path).await {
                Ok(data) => data,
                Err(e) => return Ok(error_result(format!("failed to read file: {}", e))),
            };
            let Some(file) = CommandsFile::parse(&data) else {
                return Ok(error_result("failed to parse file as YAML or JSON"));
            };
            if file.commands.is_empty() {
                return Ok(error_result("no commands found in file"));
            }

            let registry = self.state.registry();
            let mut imported = 0usize;
            let mut skipped = 0usize;
            let mut errors = Vec::new();

            for (key, mut def) in file.commands {
                if def.name.is_empty() {
                    def.name = key;
                }
                let name = def.name.clone();

                let outcome = if registry.contains(&name) {
                    if !overwrite {
                        skipped += 1;
                        continue;
                    }
                    registry.update(&name, def)
                } else {
                    registry.add(def)
                };

                match outcome {
                    Ok(()) => imported += 1,
                    Err(e) => errors.push(format!("{}: {}", name, e)),
                }
            }

            if imported > 0 {
                self.state.persist();
            }

            let mut summary = format!("Imported {} commands", imported);
            if skipped > 0 {
                summary.push_str(&format!(", skipped {} (already exist)", skipped));
            }
            if !errors.is_empty() {
                summary.push_str(&format!(", {} errors: [{}]", errors.len(), errors.join(", ")));
            }

            info!("Import from {}: {}", path, summary);
            Ok(text_result(summary))
        })
    }
}

/// Handler for the `export_config` tool.
pub struct ExportConfigHandler {
    state: Arc<AppState>,
}

impl ExportConfigHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl ToolHandler for ExportConfigHandler {
    fn name(&self) -> &str {
        "export_config"
    }

    fn description(&self) -> &str {
        "Export all registered commands to a YAML file for version control or backup."
    }

    fn input_schema(&self) -> JsonObject {
        object_schema(
            json!({
                "path": {
                    "type": "string",
                    "description": "Output file path (default: .instant-mcp/commands.yaml)"
                }
            }),
            &[],
        )
    }

    fn execute(&self, args: JsonObject) -> ToolFuture<'_> {
        Box::pin(async move {
            let path = str_arg(&args, "path").unwrap_or(DEFAULT_EXPORT_PATH);

            let commands: BTreeMap<String, CommandDef> = self
                .state
                .visible_commands()
                .into_iter()
                .map(|def| (def.name.clone(), def))
                .collect();
            if commands.is_empty() {
                return Ok(error_result("no commands to export"));
            }
            let names: Vec<&str> = commands.keys().map(String::as_str).collect();
            let names = names.join(", ");
            let count = commands.len();

            let yaml = match serde_yaml::to_string(&CommandsFile { commands }) {
                Ok(yaml) => yaml,
                Err(e) => return Ok(error_result(format!("failed to marshal YAML: {}", e))),
            };
            let header = format!(
                "# instant-mcp commands\n# Generated by export_config\n# Import with: import_config(path: \"{}\")\n\n",
                path
            );

            if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    return Ok(error_result(format!("failed to create directory: {}", e)));
                }
            }
            if let Err(e) = tokio::fs::write(path, header + &yaml).await {
                return Ok(error_result(format!("failed to write file: {}", e)));
            }

            info!("Exported {} commands to {}", count, path);
            Ok(text_result(format!(
                "Exported {} commands to {}: [{}]",
                count, path, names
            )))
        })
    }
}
