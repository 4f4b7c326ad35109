//! Command definitions: the unit stored in the command registry.
//!
//! A `CommandDef` wraps an external executable so that it can be invoked as an
//! MCP tool. Field names on the wire (`exec`, `args`, `async`, ...) are shared
//! by the state file, `get_command` output and the import/export format.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use rmcp::model::{JsonObject, Tool as McpTool};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Timeout applied when a command has none, or one that cannot be parsed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout string stored on newly added commands that do not specify one.
pub const DEFAULT_TIMEOUT_STR: &str = "120s";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("command name pattern must compile")
});

static TIMEOUT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+[smh]$").expect("timeout pattern must compile")
});

/// Type of a command argument, as exposed in the generated input schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Number,
    Boolean,
}

impl ArgType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specification of a single command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    #[serde(rename = "type")]
    pub kind: ArgType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

/// A registered command.
///
/// `args` is an ordered map: its iteration order (lexicographic by argument
/// name) is the positional order used when building the subprocess argv.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exec: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, ArgSpec>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Run detached from the request loop; the caller gets an immediate ack.
    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    pub run_async: bool,
    /// Duration string such as `30s`, `5m` or `1h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CommandDef {
    /// Build a definition from `add_command`-style tool arguments.
    ///
    /// Missing `timeout` defaults to [`DEFAULT_TIMEOUT_STR`]. Only shape errors
    /// are reported here; identity rules are checked by [`CommandDef::validate`].
    pub fn from_arguments(args: &JsonObject) -> Result<Self, String> {
        let mut def = CommandDef {
            name: str_arg(args, "name").unwrap_or_default().to_string(),
            timeout: Some(DEFAULT_TIMEOUT_STR.to_string()),
            ..Default::default()
        };
        def.apply_arguments(args)?;
        Ok(def)
    }

    /// Overlay the fields present in `args` onto this definition.
    ///
    /// `name` is never touched; `args`, when present, replaces the whole
    /// argument set.
    pub fn apply_arguments(&mut self, args: &JsonObject) -> Result<(), String> {
        if let Some(exec) = str_arg(args, "exec") {
            self.exec = exec.to_string();
        }
        if let Some(description) = str_arg(args, "description") {
            self.description = description.to_string();
        }
        if let Some(run_async) = args.get("async").and_then(Value::as_bool) {
            self.run_async = run_async;
        }
        if let Some(timeout) = str_arg(args, "timeout") {
            self.timeout = Some(timeout.to_string());
        }
        if let Some(raw) = args.get("args").and_then(Value::as_object) {
            self.args = parse_arg_specs(&self.name, raw)?;
        }
        Ok(())
    }

    /// Check the identity and shape rules a definition must satisfy before it
    /// can enter the registry.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("command name is required".to_string());
        }
        if !NAME_PATTERN.is_match(&self.name) {
            return Err(format!(
                "command name {:?} is invalid: must start with a letter, contain only letters, numbers, and underscores",
                self.name
            ));
        }
        if self.exec.is_empty() {
            return Err(format!("exec is required for command {:?}", self.name));
        }
        if let Some(timeout) = self.configured_timeout() {
            parse_timeout(timeout).map_err(|e| format!("command {:?}: {}", self.name, e))?;
        }
        Ok(())
    }

    fn configured_timeout(&self) -> Option<&str> {
        self.timeout.as_deref().filter(|t| !t.is_empty())
    }

    /// The deadline to run this command with, plus its display form.
    ///
    /// Falls back to [`DEFAULT_TIMEOUT`] when no usable timeout is set.
    pub fn effective_timeout(&self) -> (Duration, String) {
        match self.configured_timeout() {
            Some(raw) => match parse_timeout(raw) {
                Ok(duration) => (duration, raw.to_string()),
                Err(_) => (DEFAULT_TIMEOUT, DEFAULT_TIMEOUT_STR.to_string()),
            },
            None => (DEFAULT_TIMEOUT, DEFAULT_TIMEOUT_STR.to_string()),
        }
    }

    /// JSON Schema for the tool input, derived from the argument specs.
    pub fn input_schema(&self) -> JsonObject {
        let mut properties = JsonObject::new();
        let mut required = Vec::new();

        for (arg_name, spec) in &self.args {
            let mut prop = JsonObject::new();
            prop.insert("type".to_string(), json!(spec.kind.as_str()));
            if !spec.description.is_empty() {
                prop.insert("description".to_string(), json!(spec.description));
            }
            properties.insert(arg_name.clone(), Value::Object(prop));

            if spec.required {
                required.push(arg_name.clone());
            }
        }

        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        schema
    }

    /// Converts this definition to an `McpTool` for use in `tools/list`.
    pub fn to_mcp_tool(&self) -> McpTool {
        McpTool {
            name: Cow::Owned(self.name.clone()),
            title: None,
            description: Some(Cow::Owned(self.description.clone())),
            input_schema: Arc::new(self.input_schema()),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

/// Parse a duration string of the form `<integer><s|m|h>`.
pub fn parse_timeout(raw: &str) -> Result<Duration, String> {
    if !TIMEOUT_PATTERN.is_match(raw) {
        return Err(format!(
            "invalid timeout {:?} (use format like '30s', '5m', '1h')",
            raw
        ));
    }

    let (number, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid timeout number: {:?}", raw))?;

    let secs = match unit {
        "s" => value,
        "m" => value.saturating_mul(60),
        "h" => value.saturating_mul(3600),
        other => return Err(format!("invalid timeout unit {:?} (use s, m, or h)", other)),
    };
    Ok(Duration::from_secs(secs))
}

fn str_arg<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn parse_arg_specs(
    command: &str,
    raw: &JsonObject,
) -> Result<BTreeMap<String, ArgSpec>, String> {
    let mut specs = BTreeMap::new();

    for (arg_name, value) in raw {
        let obj = value.as_object().ok_or_else(|| {
            format!(
                "arg {:?} must be an object with type, description, and required fields",
                arg_name
            )
        })?;

        let kind = match obj.get("type").and_then(Value::as_str) {
            None | Some("") => {
                return Err(format!(
                    "arg {:?} in command {:?} must have a type",
                    arg_name, command
                ));
            }
            Some(raw_type) => ArgType::parse(raw_type).ok_or_else(|| {
                format!(
                    "arg {:?} in command {:?} has invalid type {:?} (must be string, number, or boolean)",
                    arg_name, command, raw_type
                )
            })?,
        };

        specs.insert(
            arg_name.clone(),
            ArgSpec {
                kind,
                description: str_arg(obj, "description").unwrap_or_default().to_string(),
                required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
            },
        );
    }

    Ok(specs)
}
