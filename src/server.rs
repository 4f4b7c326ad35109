//! MCP server: the request dispatcher and the stdio protocol loop.
//!
//! Built-in tools are served from the `ToolRegistry`; every other tool name is
//! looked up in the command registry and run as a subprocess.

use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    model::{
        CallToolResult, ErrorCode, JsonObject, ListToolsResult, ProtocolVersion,
        ServerCapabilities,
    },
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::executor;
use crate::mcp::{JsonRpcRequest, JsonRpcResponse, LineTransport};
use crate::model::CommandDef;
use crate::state::AppState;
use crate::tools::{ToolRegistry, error_result, text_result};

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<JsonObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: String,
    #[serde(default)]
    client_info: ClientInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ClientInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

/// MCP server that handles protocol requests and delegates to tool handlers.
#[derive(Clone)]
pub struct McpServer {
    name: String,
    version: String,
    state: Arc<AppState>,
    tool_registry: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a new MCP server with the given state and built-in tool registry.
    pub fn new(config: &ServerConfig, state: Arc<AppState>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
            state,
            tool_registry,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    /// Serve newline-delimited JSON-RPC until the reader is exhausted.
    ///
    /// Returns `Ok(())` when the peer closes the stream. An unreadable or
    /// malformed message ends the loop with an error.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Starting {} v{}", self.name, self.version);
        let mut transport = LineTransport::new(reader, writer);

        loop {
            let msg = match transport.read_message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading message: {:#}", e);
                    return Err(e);
                }
            };

            if let Some(response) = self.handle_message(msg).await {
                transport.write_response(&response).await?;
            }
        }

        info!("Client disconnected");
        Ok(())
    }

    /// Dispatch one message. Notifications produce no response.
    pub async fn handle_message(&self, msg: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let outcome = match msg.method.as_str() {
            "initialize" => self.initialize(msg.params),
            "notifications/initialized" => {
                info!("Client initialized");
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(msg.params).await,
            "" => Err(McpError::new(
                ErrorCode::INVALID_REQUEST,
                "Invalid request: missing method".to_string(),
                None,
            )),
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None,
            )),
        };

        let id = msg.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, e),
        })
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: InitializeParams = params
            .map(serde_json::from_value::<InitializeParams>)
            .transpose()
            .map_err(|e| McpError::invalid_params(format!("invalid initialize params: {}", e), None))?
            .unwrap_or_default();

        info!(
            "Client: {} v{} (protocol {})",
            params.client_info.name, params.client_info.version, params.protocol_version
        );

        Ok(json!({
            "protocolVersion": ProtocolVersion::V_2024_11_05,
            "capabilities": ServerCapabilities::builder().enable_tools().build(),
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            },
        }))
    }

    fn list_tools(&self) -> Result<Value, McpError> {
        let mut tools = self.tool_registry.list_tools();
        tools.extend(
            self.state
                .visible_commands()
                .iter()
                .map(CommandDef::to_mcp_tool),
        );

        let result = ListToolsResult {
            tools,
            next_cursor: None,
            ..Default::default()
        };
        to_result_value(&result)
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::invalid_params(format!("invalid tools/call params: {}", e), None))?;
        let args = params.arguments.unwrap_or_default();
        info!("Tool call: {}", params.name);

        let result = if self.tool_registry.contains(&params.name) {
            self.tool_registry
                .call_tool(&params.name, args)
                .await
                .map_err(|e| {
                    McpError::internal_error(format!("Tool execution failed: {}", e), None)
                })?
        } else {
            let def = self.state.lookup(&params.name).map_err(|_| {
                McpError::invalid_params(format!("Unknown tool: {}", params.name), None)
            })?;
            self.run_command(def, args).await
        };

        to_result_value(&result)
    }

    async fn run_command(&self, def: CommandDef, args: JsonObject) -> CallToolResult {
        if def.run_async {
            if let Err(e) = executor::check_required(&def, &args) {
                return error_result(e.to_string());
            }
            let name = def.name.clone();
            executor::spawn_detached(def, args);
            return text_result(format!("Command {:?} started in the background.", name));
        }

        match executor::execute(&def, &args).await {
            Ok(output) if output.is_empty() => text_result("(no output)"),
            Ok(output) => text_result(output),
            Err(e) => {
                warn!("Command {} failed: {}", def.name, e);
                let output = e.output();
                if output.is_empty() {
                    error_result(e.to_string())
                } else {
                    error_result(format!("{}\n{}", output, e))
                }
            }
        }
    }
}

fn to_result_value<T: serde::Serialize>(result: &T) -> Result<Value, McpError> {
    serde_json::to_value(result)
        .map_err(|e| McpError::internal_error(format!("failed to encode result: {}", e), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonFileStore;
    use crate::tools::{BUILTIN_TOOL_NAMES, builtin_registry};
    use tempfile::TempDir;

    fn test_server() -> (TempDir, McpServer) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(dir.path().join("state.json"));
        let state = Arc::new(AppState::new(Arc::new(JsonFileStore::new(
            config.state_path.clone(),
        ))));
        let tools = Arc::new(builtin_registry(state.clone()));
        (dir, McpServer::new(&config, state, tools))
    }

    /// Feed `lines` through the protocol loop and collect every response.
    async fn exchange(server: &McpServer, lines: &[Value]) -> (Result<()>, Vec<Value>) {
        let input: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        exchange_raw(server, &input).await
    }

    async fn exchange_raw(server: &McpServer, input: &str) -> (Result<()>, Vec<Value>) {
        let mut out = Vec::new();
        let outcome = server.run(input.as_bytes(), &mut out).await;
        let responses = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (outcome, responses)
    }

    fn call(id: u64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
    }

    fn text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    fn is_error(response: &Value) -> bool {
        response["result"]["isError"] == json!(true)
    }

    #[tokio::test]
    async fn test_handshake_and_listing() {
        let (_dir, server) = test_server();
        let (outcome, responses) = exchange(
            &server,
            &[
                json!({
                    "jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {},
                        "clientInfo": {"name": "test-client", "version": "1.0"}
                    }
                }),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
                json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
            ],
        )
        .await;

        outcome.unwrap();
        assert_eq!(responses.len(), 3);

        let init = &responses[0]["result"];
        assert_eq!(init["protocolVersion"], "2024-11-05");
        assert!(init["capabilities"]["tools"].is_object());
        assert_eq!(init["serverInfo"]["name"], "instant-mcp");

        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"], json!({}));

        let names: Vec<&str> = responses[2]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, BUILTIN_TOOL_NAMES.to_vec());
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let (_dir, server) = test_server();
        let (_, responses) = exchange(
            &server,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
                json!({"jsonrpc": "2.0", "method": "notifications/cancelled"}),
                call(2, "nope", json!({})),
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32601);
        assert_eq!(responses[0]["error"]["message"], "Method not found: resources/list");
        assert_eq!(responses[1]["error"]["code"], -32602);
        assert_eq!(responses[1]["error"]["message"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_message_without_method_is_invalid_request() {
        let (_dir, server) = test_server();
        let (outcome, responses) = exchange(
            &server,
            &[
                json!({"jsonrpc": "2.0", "id": 7, "result": {}}),
                json!({"jsonrpc": "2.0", "result": {}}),
                json!({"jsonrpc": "2.0", "id": 8, "method": "ping"}),
            ],
        )
        .await;

        outcome.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(responses[0]["error"]["message"], "Invalid request: missing method");
        assert_eq!(responses[1]["id"], 8);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_registered_command_becomes_tool() {
        let (_dir, server) = test_server();
        let (outcome, responses) = exchange(
            &server,
            &[
                call(
                    1,
                    "add_command",
                    json!({
                        "name": "say",
                        "exec": "/bin/echo",
                        "description": "Echo a message",
                        "args": {"msg": {"type": "string", "required": true}}
                    }),
                ),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                call(3, "say", json!({"msg": "hello"})),
                call(4, "say", json!({})),
            ],
        )
        .await;

        outcome.unwrap();
        assert!(!is_error(&responses[0]));

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        let say = tools.last().unwrap();
        assert_eq!(say["name"], "say");
        assert_eq!(say["inputSchema"]["required"], json!(["msg"]));

        assert!(!is_error(&responses[2]));
        assert_eq!(text(&responses[2]).trim(), "hello");

        assert!(is_error(&responses[3]));
        assert_eq!(text(&responses[3]), "missing required argument: msg");
    }

    #[tokio::test]
    async fn test_command_failures_are_tool_errors() {
        let (_dir, server) = test_server();
        server
            .state()
            .registry()
            .add(CommandDef {
                name: "fails".to_string(),
                exec: "/bin/sh".to_string(),
                args: [(
                    "script".to_string(),
                    crate::model::ArgSpec {
                        kind: crate::model::ArgType::String,
                        description: String::new(),
                        required: true,
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            })
            .unwrap();
        server
            .state()
            .registry()
            .add(CommandDef {
                name: "quiet".to_string(),
                exec: "/bin/true".to_string(),
                ..Default::default()
            })
            .unwrap();

        let (_, responses) = exchange(
            &server,
            &[
                call(1, "fails", json!({"script": "-c"})),
                call(2, "quiet", json!({})),
            ],
        )
        .await;

        assert!(is_error(&responses[0]));
        assert!(text(&responses[0]).contains("command failed"));

        assert!(!is_error(&responses[1]));
        assert_eq!(text(&responses[1]), "(no output)");
    }

    #[tokio::test]
    async fn test_failure_output_precedes_error() {
        let (_dir, server) = test_server();
        server
            .state()
            .registry()
            .add(CommandDef {
                name: "noisy".to_string(),
                exec: "/bin/ls".to_string(),
                args: [(
                    "path".to_string(),
                    crate::model::ArgSpec {
                        kind: crate::model::ArgType::String,
                        description: String::new(),
                        required: true,
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            })
            .unwrap();

        let (_, responses) = exchange(
            &server,
            &[call(1, "noisy", json!({"path": "/definitely/not/here"}))],
        )
        .await;

        assert!(is_error(&responses[0]));
        let body = text(&responses[0]);
        assert!(body.starts_with("stderr: "), "{}", body);
        assert!(body.contains("\ncommand failed: "), "{}", body);
    }

    #[tokio::test]
    async fn test_async_command_acknowledged_immediately() {
        let (_dir, server) = test_server();
        let (_, responses) = exchange(
            &server,
            &[
                call(
                    1,
                    "add_command",
                    json!({"name": "slow", "exec": "/bin/sleep", "async": true,
                           "args": {"secs": {"type": "number", "required": true}}}),
                ),
                call(2, "slow", json!({"secs": 5})),
                call(3, "slow", json!({})),
            ],
        )
        .await;

        assert_eq!(text(&responses[1]), "Command \"slow\" started in the background.");
        assert!(is_error(&responses[2]));
        assert_eq!(text(&responses[2]), "missing required argument: secs");
    }

    #[tokio::test]
    async fn test_malformed_message_stops_loop() {
        let (_dir, server) = test_server();
        let input = format!(
            "{}\n\n{{this is not json\n{}\n",
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        );
        let (outcome, responses) = exchange_raw(&server, &input).await;

        assert!(outcome.is_err());
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_builtin_wins_over_loaded_entry() {
        let (_dir, server) = test_server();
        let mut commands = crate::registry::CommandSnapshot::new();
        commands.insert(
            "help".to_string(),
            CommandDef {
                name: "help".to_string(),
                exec: "/bin/echo".to_string(),
                ..Default::default()
            },
        );
        server.state().registry().replace(commands);

        let (_, responses) = exchange(
            &server,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
                call(2, "help", json!({})),
            ],
        )
        .await;

        let tools = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), BUILTIN_TOOL_NAMES.len());
        assert!(text(&responses[1]).starts_with("# instant-mcp Usage Guide"));
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let (dir, server) = test_server();
        exchange(
            &server,
            &[call(1, "add_command", json!({"name": "kept", "exec": "/bin/echo"}))],
        )
        .await
        .0
        .unwrap();

        let config = ServerConfig::new(dir.path().join("state.json"));
        let state = Arc::new(AppState::new(Arc::new(JsonFileStore::new(
            config.state_path.clone(),
        ))));
        assert_eq!(state.load().unwrap(), 1);
        assert!(state.lookup("kept").is_ok());
    }
}
