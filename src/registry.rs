//! In-memory command registry.
//!
//! The registry is the single source of truth for the running server. Reads
//! (`get`, `list`, `snapshot`) share the lock; every mutation takes it
//! exclusively, so readers only ever observe committed states.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::CommandDef;

/// Full registry contents keyed by command name.
pub type CommandSnapshot = BTreeMap<String, CommandDef>;

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A command with this name is already registered.
    AlreadyExists(String),
    /// No command with this name is registered.
    NotFound(String),
    /// The definition violates a validation rule.
    Invalid(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists(name) => write!(
                f,
                "command {:?} already exists, use update to modify it",
                name
            ),
            RegistryError::NotFound(name) => write!(f, "command {:?} not found", name),
            RegistryError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Concurrent-safe store of registered commands.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: RwLock<CommandSnapshot>,
    /// Names owned by built-in tools; never accepted for new definitions.
    reserved: HashSet<String>,
}

impl CommandRegistry {
    /// Create an empty registry with no reserved names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that refuses the given names.
    pub fn with_reserved<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: RwLock::new(CommandSnapshot::new()),
            reserved: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` belongs to a built-in tool.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    fn read(&self) -> RwLockReadGuard<'_, CommandSnapshot> {
        self.commands.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CommandSnapshot> {
        self.commands.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(&self, def: &CommandDef) -> Result<(), RegistryError> {
        def.validate().map_err(RegistryError::Invalid)?;
        if self.is_reserved(&def.name) {
            return Err(RegistryError::Invalid(format!(
                "command name {:?} is reserved for a built-in tool",
                def.name
            )));
        }
        Ok(())
    }

    /// Register a new command.
    pub fn add(&self, def: CommandDef) -> Result<(), RegistryError> {
        self.validate(&def)?;

        let mut commands = self.write();
        if commands.contains_key(&def.name) {
            return Err(RegistryError::AlreadyExists(def.name));
        }
        commands.insert(def.name.clone(), def);
        Ok(())
    }

    /// Unregister a command by name.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Result<CommandDef, RegistryError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All registered commands, ordered by name.
    pub fn list(&self) -> Vec<CommandDef> {
        self.read().values().cloned().collect()
    }

    /// Replace the command registered as `name` with `def`.
    ///
    /// When `def.name` differs from `name` the entry moves to the new name. A
    /// different command already registered under the new name is overwritten.
    pub fn update(&self, name: &str, def: CommandDef) -> Result<(), RegistryError> {
        self.validate(&def)?;

        let mut commands = self.write();
        if !commands.contains_key(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if def.name != name {
            commands.remove(name);
        }
        commands.insert(def.name.clone(), def);
        Ok(())
    }

    /// Independent copy of the full registry contents.
    pub fn snapshot(&self) -> CommandSnapshot {
        self.read().clone()
    }

    /// Swap the entire contents for `commands`.
    ///
    /// Used for startup load and batch rollback; entries are taken as-is.
    pub fn replace(&self, commands: CommandSnapshot) {
        *self.write() = commands;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
