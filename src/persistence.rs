//! State file persistence for the command registry.
//!
//! The in-memory registry is authoritative while the server runs; the state
//! file only provides durability across restarts. Saves go through a temp file
//! in the target directory followed by a rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::registry::{CommandRegistry, CommandSnapshot};

/// Format version written to new state files.
pub const STATE_VERSION: &str = "1.0";

/// Load/save contract for registry contents.
pub trait CatalogStore: Send + Sync {
    /// Read the persisted commands. A missing source yields an empty map.
    fn load(&self) -> Result<CommandSnapshot>;

    /// Durably write `commands`, replacing whatever was stored before.
    fn save(&self, commands: &CommandSnapshot) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    commands: CommandSnapshot,
}

/// JSON state file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".bak");
        PathBuf::from(backup)
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<CommandSnapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file found at {}, starting fresh", self.path.display());
                return Ok(CommandSnapshot::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read state file {}", self.path.display())
                });
            }
        };

        match serde_json::from_str::<StateFile>(&raw) {
            Ok(state) => {
                info!(
                    "Loaded {} commands from {} (format {})",
                    state.commands.len(),
                    self.path.display(),
                    state.version
                );
                Ok(state.commands)
            }
            Err(e) => {
                let backup = self.backup_path();
                match fs::rename(&self.path, &backup) {
                    Ok(()) => warn!(
                        "State file corrupted ({}), backed up to {}, starting fresh",
                        e,
                        backup.display()
                    ),
                    Err(rename_err) => warn!(
                        "State file corrupted ({}) and could not be moved aside: {}",
                        e, rename_err
                    ),
                }
                Ok(CommandSnapshot::new())
            }
        }
    }

    fn save(&self, commands: &CommandSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create state directory {}", dir.display()))?;

        let state = StateFile {
            version: STATE_VERSION.to_string(),
            saved_at: Some(Utc::now()),
            commands: commands.clone(),
        };
        let data = serde_json::to_vec_pretty(&state).context("failed to serialize state")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .context("failed to create temp state file")?;
        tmp.write_all(&data)
            .context("failed to write temp state file")?;
        tmp.as_file()
            .sync_all()
            .context("failed to flush temp state file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to rename state file into {}", self.path.display()))?;

        Ok(())
    }
}

/// Save the registry through `store`, logging (not returning) any failure.
///
/// Returns whether the save succeeded. A failed save never undoes the
/// in-memory mutation that preceded it.
pub fn persist(registry: &CommandRegistry, store: &dyn CatalogStore) -> bool {
    match store.save(&registry.snapshot()) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to persist state: {:#}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandDef;

    fn sample() -> CommandSnapshot {
        let mut commands = CommandSnapshot::new();
        for name in ["alpha", "beta"] {
            commands.insert(
                name.to_string(),
                CommandDef {
                    name: name.to_string(),
                    exec: "/bin/echo".to_string(),
                    timeout: Some("30s".to_string()),
                    ..Default::default()
                },
            );
        }
        commands
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], "1.0");
        assert!(raw["saved_at"].is_string());
        assert_eq!(raw["commands"]["alpha"]["exec"], "/bin/echo");
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        store.save(&sample()).unwrap();
        store.save(&CommandSnapshot::new()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().unwrap().is_empty());
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("state.json.bak")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_file_without_commands_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"version": "1.0"}"#).unwrap();

        assert!(JsonFileStore::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn test_file_without_version_keeps_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"commands": {"hello": {"name": "hello", "exec": "/bin/echo"}}}"#,
        )
        .unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["hello"].exec, "/bin/echo");
        assert!(path.exists());
        assert!(!dir.path().join("state.json.bak").exists());
    }

    #[test]
    fn test_persist_reports_failure_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes the final rename fail
        let path = dir.path().join("state.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        let registry = CommandRegistry::new();
        registry.replace(sample());
        assert!(!persist(&registry, &JsonFileStore::new(&path)));
        assert_eq!(registry.len(), 2);
    }
}
