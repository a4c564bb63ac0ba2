//! Declarative cluster topology and its expansion into an ordered plan.

use crate::core::{BootstrapError, IndexSpec, KeyPattern, Namespace, Result, ShardSpec};
use crate::plan::{BootstrapPlan, FailurePolicy, Step};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Topology applied when no file is given on the command line.
pub const EMBEDDED_TOPOLOGY: &str = include_str!("../config/banking_topology.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    pub shards: Vec<ShardSpec>,
    #[serde(default)]
    pub databases: Vec<DatabaseTopology>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseTopology {
    pub name: String,
    #[serde(default)]
    pub partitioned: bool,
    #[serde(default)]
    pub collections: Vec<CollectionTopology>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionTopology {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<KeyPattern>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl Topology {
    /// The banking cluster: two replica-set shards, `banking` partitioned,
    /// accounts and transactions sharded on hashed keys.
    pub fn banking() -> Result<Self> {
        Self::from_json_str(EMBEDDED_TOPOLOGY)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let topology: Self = serde_json::from_str(raw)?;
        topology.validate()?;
        Ok(topology)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Io(format!("failed to read topology '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards.is_empty() {
            return Err(BootstrapError::InvalidTopology(
                "topology must declare at least one shard".to_string(),
            ));
        }

        let mut database_names = HashSet::new();
        for database in &self.databases {
            if !database_names.insert(database.name.as_str()) {
                return Err(BootstrapError::InvalidTopology(format!(
                    "database '{}' is declared twice",
                    database.name
                )));
            }

            let mut collection_names = HashSet::new();
            for collection in &database.collections {
                let namespace = Namespace::new(&database.name, &collection.name)?;
                if !collection_names.insert(collection.name.as_str()) {
                    return Err(BootstrapError::InvalidTopology(format!(
                        "collection {namespace} is declared twice"
                    )));
                }
                if collection.shard_key.is_some() && !database.partitioned {
                    return Err(BootstrapError::InvalidTopology(format!(
                        "collection {namespace} declares a shard key but database '{}' is not partitioned",
                        database.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Expands the topology into steps in dependency order: shards, then per
    /// database partitioning, then per collection creation, shard key and
    /// indexes.
    pub fn to_plan(&self) -> Result<BootstrapPlan> {
        let mut steps: Vec<Step> = self.shards.iter().cloned().map(Step::add_shard).collect();

        for database in &self.databases {
            if database.partitioned {
                steps.push(Step::enable_partitioning(database.name.clone()));
            }
            for collection in &database.collections {
                let namespace = Namespace::new(&database.name, &collection.name)?;
                steps.push(Step::create_collection(namespace.clone()));
                if let Some(key) = &collection.shard_key {
                    steps.push(Step::declare_partition_key(namespace.clone(), key.clone()));
                }
                steps.extend(
                    collection
                        .indexes
                        .iter()
                        .cloned()
                        .map(|index| Step::create_index(namespace.clone(), index)),
                );
            }
        }

        BootstrapPlan::new(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{FailureAction, StepKind};

    #[test]
    fn embedded_topology_matches_banking_layout() {
        let topology = Topology::banking().unwrap();
        assert_eq!(topology.shards.len(), 2);
        assert_eq!(topology.shards[0].shard_id(), Some("shard1ReplSet"));

        let banking = &topology.databases[0];
        assert_eq!(banking.name, "banking");
        assert!(banking.partitioned);

        let accounts = banking
            .collections
            .iter()
            .find(|c| c.name == "accounts")
            .unwrap();
        assert_eq!(
            accounts.shard_key.as_ref().map(|k| k.to_string()),
            Some("{ accountNumber: \"hashed\" }".to_string())
        );
        assert_eq!(
            topology.failure_policy.create_index,
            FailureAction::Continue
        );
    }

    #[test]
    fn plan_follows_dependency_order() {
        let plan = Topology::banking().unwrap().to_plan().unwrap();
        let kinds = plan.steps().iter().map(|s| s.kind()).collect::<Vec<_>>();

        assert_eq!(kinds[0], StepKind::AddShardMember);
        assert_eq!(kinds[1], StepKind::AddShardMember);
        assert_eq!(kinds[2], StepKind::EnableDatabasePartitioning);

        let first_key = kinds
            .iter()
            .position(|k| *k == StepKind::DeclarePartitionKey)
            .unwrap();
        assert!(first_key > 2);
        assert_eq!(
            plan.steps()
                .iter()
                .filter(|s| s.kind() == StepKind::CreateIndex)
                .count(),
            7
        );
    }

    #[test]
    fn rejects_shard_key_in_unpartitioned_database() {
        let raw = r#"{
            "shards": ["rs/h:1"],
            "databases": [{
                "name": "banking",
                "collections": [{"name": "accounts", "shard_key": {"accountNumber": "hashed"}}]
            }]
        }"#;
        assert!(matches!(
            Topology::from_json_str(raw),
            Err(BootstrapError::InvalidTopology(_))
        ));
    }

    #[test]
    fn rejects_empty_shards_and_unknown_fields() {
        assert!(Topology::from_json_str(r#"{"shards": []}"#).is_err());
        assert!(Topology::from_json_str(r#"{"shards": ["rs/h:1"], "extra": 1}"#).is_err());
        assert!(Topology::from_json_str(r#"{"shards": ["not a host"]}"#).is_err());
    }

    #[test]
    fn rejects_duplicate_collections() {
        let raw = r#"{
            "shards": ["rs/h:1"],
            "databases": [{"name": "banking", "collections": [{"name": "a"}, {"name": "a"}]}]
        }"#;
        assert!(Topology::from_json_str(raw).is_err());
    }

    #[test]
    fn loads_topology_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        std::fs::write(&path, r#"{"shards": ["rs0/db0:27018"]}"#).unwrap();

        let topology = Topology::from_file(&path).unwrap();
        assert_eq!(topology.shards.len(), 1);
        assert_eq!(topology.failure_policy, FailurePolicy::default());
        assert_eq!(topology.to_plan().unwrap().len(), 1);

        assert!(matches!(
            Topology::from_file(&dir.path().join("missing.json")),
            Err(BootstrapError::Io(_))
        ));
    }
}
