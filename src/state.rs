//! Shared application state handed to every built-in tool.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::model::CommandDef;
use crate::persistence::{self, CatalogStore};
use crate::registry::{CommandRegistry, RegistryError};
use crate::tools::BUILTIN_TOOL_NAMES;

/// Owns the single command registry and the handle used to persist it.
pub struct AppState {
    registry: CommandRegistry,
    store: Arc<dyn CatalogStore>,
}

impl AppState {
    /// Create empty state backed by `store`. Built-in tool names are reserved.
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            registry: CommandRegistry::with_reserved(BUILTIN_TOOL_NAMES.iter().copied()),
            store,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn CatalogStore {
        self.store.as_ref()
    }

    /// Look up a command that can be dispatched.
    ///
    /// Entries whose names collide with a built-in (only possible through a
    /// loaded state file) are treated as absent.
    pub fn lookup(&self, name: &str) -> Result<CommandDef, RegistryError> {
        if self.registry.is_reserved(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        self.registry.get(name)
    }

    /// Commands exposed as tools, ordered by name.
    pub fn visible_commands(&self) -> Vec<CommandDef> {
        self.registry
            .list()
            .into_iter()
            .filter(|def| !self.registry.is_reserved(&def.name))
            .collect()
    }

    /// Replace the registry contents with whatever the store holds.
    pub fn load(&self) -> Result<usize> {
        let commands = self.store.load()?;
        let count = commands.len();
        self.registry.replace(commands);
        info!("Restored {} commands from state", count);
        Ok(count)
    }

    /// Save the current registry contents; failures are logged only.
    pub fn persist(&self) -> bool {
        persistence::persist(&self.registry, self.store.as_ref())
    }
}
