use anyhow::{Context, anyhow};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const SERVER_NAME: &str = "instant-mcp";

/// Directory under the home directory holding the default state file.
pub const DEFAULT_STATE_DIR: &str = ".instant-mcp";
pub const DEFAULT_STATE_FILE: &str = "state.json";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Reported as `serverInfo.name` during the handshake.
    pub name: String,
    pub version: String,
    pub state_path: PathBuf,
}

impl ServerConfig {
    pub fn new(state_path: PathBuf) -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            state_path,
        }
    }
}

/// Pick the state file: an explicit path (flag or `INSTANT_MCP_STATE`, both
/// surfaced through the CLI) wins, otherwise `~/.instant-mcp/state.json`.
pub fn resolve_state_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    state_path_with_home(explicit, dirs::home_dir())
}

fn state_path_with_home(
    explicit: Option<PathBuf>,
    home: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }

    let home = home.ok_or_else(|| {
        anyhow!("Could not determine home directory (pass --state-file or set INSTANT_MCP_STATE)")
    })?;
    Ok(home.join(DEFAULT_STATE_DIR).join(DEFAULT_STATE_FILE))
}

/// Create the directory that will hold `state_path`.
pub fn ensure_state_dir(state_path: &Path) -> anyhow::Result<()> {
    match state_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display())),
        _ => Ok(()),
    }
}
