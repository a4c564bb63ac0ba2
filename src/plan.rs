//! Ordered bootstrap steps and the policy deciding what a failed step does to
//! the rest of the run.

use crate::core::{BootstrapError, ErrorKind, IndexSpec, KeyPattern, Namespace, Result, ShardSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    AddShardMember,
    EnableDatabasePartitioning,
    CreateCollection,
    DeclarePartitionKey,
    CreateIndex,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AddShardMember => "add shard",
            Self::EnableDatabasePartitioning => "enable partitioning",
            Self::CreateCollection => "create collection",
            Self::DeclarePartitionKey => "declare shard key",
            Self::CreateIndex => "create index",
        };
        write!(f, "{label}")
    }
}

/// What a step acts on. The variant determines the step kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    Shard(ShardSpec),
    Database(String),
    Collection(Namespace),
    PartitionKey {
        namespace: Namespace,
        key: KeyPattern,
    },
    Index {
        namespace: Namespace,
        index: IndexSpec,
    },
}

/// One declarative configuration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    target: StepTarget,
}

impl Step {
    pub fn add_shard(spec: ShardSpec) -> Self {
        Self {
            target: StepTarget::Shard(spec),
        }
    }

    pub fn enable_partitioning(database: impl Into<String>) -> Self {
        Self {
            target: StepTarget::Database(database.into()),
        }
    }

    pub fn create_collection(namespace: Namespace) -> Self {
        Self {
            target: StepTarget::Collection(namespace),
        }
    }

    pub fn declare_partition_key(namespace: Namespace, key: KeyPattern) -> Self {
        Self {
            target: StepTarget::PartitionKey { namespace, key },
        }
    }

    pub fn create_index(namespace: Namespace, index: IndexSpec) -> Self {
        Self {
            target: StepTarget::Index { namespace, index },
        }
    }

    pub fn kind(&self) -> StepKind {
        match &self.target {
            StepTarget::Shard(_) => StepKind::AddShardMember,
            StepTarget::Database(_) => StepKind::EnableDatabasePartitioning,
            StepTarget::Collection(_) => StepKind::CreateCollection,
            StepTarget::PartitionKey { .. } => StepKind::DeclarePartitionKey,
            StepTarget::Index { .. } => StepKind::CreateIndex,
        }
    }

    pub fn target(&self) -> &StepTarget {
        &self.target
    }

    /// Short human-readable description of the target.
    pub fn describe(&self) -> String {
        match &self.target {
            StepTarget::Shard(spec) => spec.to_string(),
            StepTarget::Database(name) => name.clone(),
            StepTarget::Collection(ns) => ns.to_string(),
            StepTarget::PartitionKey { namespace, key } => format!("{namespace} {key}"),
            StepTarget::Index { namespace, index } => {
                let unique = if index.unique { " unique" } else { "" };
                format!(
                    "{namespace} {} ({}{unique})",
                    index.keys,
                    index.resolved_name()
                )
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Stop the run; later steps depend on this one.
    Abort,
    /// Record the failure and move on to the next step.
    Continue,
}

/// Per step kind reaction to a failed step.
///
/// Configuration conflicts always abort, whatever the configured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    pub add_shard_member: FailureAction,
    pub enable_partitioning: FailureAction,
    pub create_collection: FailureAction,
    pub declare_partition_key: FailureAction,
    pub create_index: FailureAction,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            add_shard_member: FailureAction::Abort,
            enable_partitioning: FailureAction::Abort,
            create_collection: FailureAction::Abort,
            declare_partition_key: FailureAction::Abort,
            create_index: FailureAction::Continue,
        }
    }
}

impl FailurePolicy {
    pub fn action_for(&self, kind: StepKind) -> FailureAction {
        match kind {
            StepKind::AddShardMember => self.add_shard_member,
            StepKind::EnableDatabasePartitioning => self.enable_partitioning,
            StepKind::CreateCollection => self.create_collection,
            StepKind::DeclarePartitionKey => self.declare_partition_key,
            StepKind::CreateIndex => self.create_index,
        }
    }

    /// Decides what a failure of the given category does to the run.
    pub fn decide(&self, kind: StepKind, error_kind: ErrorKind) -> FailureAction {
        if error_kind == ErrorKind::ConfigurationConflict {
            return FailureAction::Abort;
        }
        self.action_for(kind)
    }
}

/// A validated, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    steps: Vec<Step>,
}

impl BootstrapPlan {
    /// Validates ordering constraints:
    /// - a shard key declaration follows partitioning of its database,
    /// - an index follows creation or sharding of its collection,
    /// - shard ids are unique.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let mut shard_ids = HashSet::new();
        let mut partitioned = HashSet::new();
        let mut collections = HashSet::new();

        for (position, step) in steps.iter().enumerate() {
            match step.target() {
                StepTarget::Shard(spec) => {
                    if let Some(id) = spec.shard_id() {
                        if !shard_ids.insert(id.to_string()) {
                            return Err(BootstrapError::InvalidPlan(format!(
                                "step {}: shard '{id}' is registered twice",
                                position + 1
                            )));
                        }
                    }
                }
                StepTarget::Database(name) => {
                    partitioned.insert(name.clone());
                }
                StepTarget::Collection(ns) => {
                    collections.insert(ns.clone());
                }
                StepTarget::PartitionKey { namespace, .. } => {
                    if !partitioned.contains(namespace.database()) {
                        return Err(BootstrapError::InvalidPlan(format!(
                            "step {}: shard key for {namespace} is declared before partitioning is enabled on '{}'",
                            position + 1,
                            namespace.database()
                        )));
                    }
                    collections.insert(namespace.clone());
                }
                StepTarget::Index { namespace, .. } => {
                    if !collections.contains(namespace) {
                        return Err(BootstrapError::InvalidPlan(format!(
                            "step {}: index on {namespace} is declared before the collection exists",
                            position + 1
                        )));
                    }
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
