//! Registry mutations and batched application of them.
//!
//! A batch is an ordered list of `add` / `remove` / `update` operations. In
//! atomic mode the registry is snapshotted first and restored on the first
//! failure; in partial mode every operation is attempted and reported on its
//! own. Either way the state file is written at most once per batch.

use std::fmt;

use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::model::CommandDef;
use crate::persistence::{self, CatalogStore};
use crate::registry::{CommandRegistry, RegistryError};

/// Kind of registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Add,
    Remove,
    Update,
}

impl Mutation {
    pub fn parse(operation: &str) -> Option<Self> {
        match operation {
            "add_command" | "add" => Some(Self::Add),
            "remove_command" | "remove" => Some(Self::Remove),
            "update_command" | "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Errors from a single mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    UnknownOperation(String),
    MissingName,
    InvalidParams(String),
    Registry(RegistryError),
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::UnknownOperation(op) => write!(f, "unknown operation: {}", op),
            OpError::MissingName => write!(f, "name is required"),
            OpError::InvalidParams(msg) => write!(f, "{}", msg),
            OpError::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OpError {}

impl From<RegistryError> for OpError {
    fn from(err: RegistryError) -> Self {
        OpError::Registry(err)
    }
}

fn name_param(params: &JsonObject) -> Option<&str> {
    params
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Apply one mutation to `registry`, returning the name of the affected command.
///
/// `update` overlays the supplied fields on the current definition; an
/// optional `new_name` moves the entry.
pub fn apply_mutation(
    registry: &CommandRegistry,
    mutation: Mutation,
    params: &JsonObject,
) -> Result<String, OpError> {
    match mutation {
        Mutation::Add => {
            let def = CommandDef::from_arguments(params).map_err(OpError::InvalidParams)?;
            let name = def.name.clone();
            registry.add(def)?;
            Ok(name)
        }
        Mutation::Remove => {
            let name = name_param(params).ok_or(OpError::MissingName)?;
            registry.remove(name)?;
            Ok(name.to_string())
        }
        Mutation::Update => {
            let name = name_param(params).ok_or(OpError::MissingName)?;
            let mut def = registry.get(name)?;
            def.apply_arguments(params).map_err(OpError::InvalidParams)?;
            if let Some(new_name) = params.get("new_name").and_then(Value::as_str) {
                def.name = new_name.to_string();
            }
            let final_name = def.name.clone();
            registry.update(name, def)?;
            Ok(final_name)
        }
    }
}

/// One operation of a batch as supplied by the caller.
#[derive(Debug, Clone)]
pub struct BatchOp {
    pub operation: String,
    pub params: JsonObject,
}

impl BatchOp {
    pub fn new(operation: impl Into<String>, params: JsonObject) -> Self {
        Self {
            operation: operation.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// All operations succeed or none are kept.
    Atomic,
    /// Each operation stands on its own.
    Partial,
}

/// Outcome of one batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub index: usize,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// Atomic batch where every operation succeeded.
    Committed { results: Vec<BatchResult> },
    /// Atomic batch undone after the operation at `failed_at` failed.
    RolledBack {
        failed_at: usize,
        error: String,
        results: Vec<BatchResult>,
    },
    /// Non-atomic batch.
    Partial {
        succeeded: usize,
        results: Vec<BatchResult>,
    },
}

impl BatchReport {
    pub fn results(&self) -> &[BatchResult] {
        match self {
            BatchReport::Committed { results }
            | BatchReport::RolledBack { results, .. }
            | BatchReport::Partial { results, .. } => results,
        }
    }

    /// Whether every operation was applied and kept.
    pub fn is_success(&self) -> bool {
        match self {
            BatchReport::Committed { .. } => true,
            BatchReport::RolledBack { .. } => false,
            BatchReport::Partial { succeeded, results } => *succeeded == results.len(),
        }
    }

    /// Caller-facing JSON body.
    pub fn to_json(&self) -> Value {
        match self {
            BatchReport::Committed { results } => json!({
                "success": true,
                "summary": format!("{}/{} operations succeeded", results.len(), results.len()),
                "results": results,
            }),
            BatchReport::RolledBack {
                failed_at,
                error,
                results,
            } => json!({
                "success": false,
                "rolled_back": true,
                "failed_at": failed_at,
                "error": error,
                "results": results,
            }),
            BatchReport::Partial { succeeded, results } => json!({
                "success": *succeeded == results.len(),
                "summary": format!("{}/{} operations succeeded", succeeded, results.len()),
                "results": results,
            }),
        }
    }
}

/// Applies batches of mutations against one registry.
pub struct BatchCoordinator<'a> {
    registry: &'a CommandRegistry,
    store: &'a dyn CatalogStore,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(registry: &'a CommandRegistry, store: &'a dyn CatalogStore) -> Self {
        Self { registry, store }
    }

    pub fn run(&self, ops: &[BatchOp], mode: BatchMode) -> BatchReport {
        match mode {
            BatchMode::Atomic => self.run_atomic(ops),
            BatchMode::Partial => self.run_partial(ops),
        }
    }

    fn apply(&self, index: usize, op: &BatchOp) -> (BatchResult, Option<OpError>) {
        let outcome = match Mutation::parse(&op.operation) {
            Some(mutation) => apply_mutation(self.registry, mutation, &op.params),
            None => Err(OpError::UnknownOperation(op.operation.clone())),
        };

        let result = BatchResult {
            index,
            operation: op.operation.clone(),
            name: name_param(&op.params).map(str::to_string),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
        };
        debug!(index, operation = %op.operation, success = result.success, "Batch operation applied");
        (result, outcome.err())
    }

    /// Apply `ops` in order, restoring the pre-batch catalog on the first failure.
    ///
    /// The snapshot and the rollback are separate registry calls, so atomic
    /// batches assume a single writer at a time. A write from another owner
    /// landing between them is lost on rollback.
    fn run_atomic(&self, ops: &[BatchOp]) -> BatchReport {
        let snapshot = self.registry.snapshot();
        let mut results = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            let (result, error) = self.apply(index, op);
            results.push(result);

            if let Some(error) = error {
                self.registry.replace(snapshot);
                warn!(
                    "Atomic batch rolled back at operation {} ({}): {}",
                    index, op.operation, error
                );
                return BatchReport::RolledBack {
                    failed_at: index,
                    error: error.to_string(),
                    results,
                };
            }
        }

        persistence::persist(self.registry, self.store);
        info!("Atomic batch committed {} operations", results.len());
        BatchReport::Committed { results }
    }

    fn run_partial(&self, ops: &[BatchOp]) -> BatchReport {
        let results: Vec<BatchResult> = ops
            .iter()
            .enumerate()
            .map(|(index, op)| self.apply(index, op).0)
            .collect();
        let succeeded = results.iter().filter(|r| r.success).count();

        if succeeded > 0 {
            persistence::persist(self.registry, self.store);
        }
        info!("Partial batch: {}/{} operations succeeded", succeeded, results.len());
        BatchReport::Partial { succeeded, results }
    }
}
