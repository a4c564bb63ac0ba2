use super::{ControlOp, ControlPlane};
use crate::core::{
    BootstrapError, CollectionInfo, DatabaseInfo, IndexInfo, IndexSpec, KeyDirection, KeyPattern,
    Namespace, Result, ShardMember, ShardSpec,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct SimCollection {
    shard_key: Option<KeyPattern>,
    indexes: Vec<IndexInfo>,
}

impl SimCollection {
    fn new() -> Self {
        Self {
            shard_key: None,
            indexes: vec![IndexInfo {
                name: "_id_".to_string(),
                keys: KeyPattern::single("_id", KeyDirection::Ascending),
                unique: true,
            }],
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    available: bool,
    shards: Vec<ShardMember>,
    databases: BTreeMap<String, bool>,
    collections: BTreeMap<Namespace, SimCollection>,
    calls: HashMap<ControlOp, usize>,
    faults: HashMap<ControlOp, VecDeque<BootstrapError>>,
}

impl SimState {
    fn ensure_database(&mut self, database: &str) {
        self.databases.entry(database.to_string()).or_insert(false);
    }

    fn ensure_collection(&mut self, namespace: &Namespace) -> &mut SimCollection {
        self.ensure_database(namespace.database());
        self.collections
            .entry(namespace.clone())
            .or_insert_with(SimCollection::new)
    }
}

/// Final cluster state as seen by the simulated router, for comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub shards: Vec<ShardMember>,
    pub partitioned_databases: Vec<String>,
    pub shard_keys: BTreeMap<Namespace, KeyPattern>,
    pub indexes: BTreeMap<Namespace, Vec<String>>,
}

/// A simulated cluster router held entirely in memory.
///
/// Mirrors the router's replies closely enough to exercise the idempotent
/// apply path: duplicate registrations and re-declarations fail with the
/// same codes a live router uses. Every call is counted and a queue of
/// injected faults can be armed per operation.
#[derive(Clone)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<SimState>>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    /// Creates an empty, reachable cluster with no shards.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                available: true,
                ..SimState::default()
            })),
        }
    }

    /// Makes every subsequent call fail as unreachable (or reachable again).
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Queues an error returned by the next call of `op` instead of executing it.
    pub async fn fail_next(&self, op: ControlOp, err: BootstrapError) {
        let mut state = self.state.lock().await;
        state.faults.entry(op).or_default().push_back(err);
    }

    /// Number of calls made to `op`, including failed ones.
    pub async fn calls(&self, op: ControlOp) -> usize {
        let state = self.state.lock().await;
        state.calls.get(&op).copied().unwrap_or_default()
    }

    /// Total number of mutating calls made so far.
    pub async fn mutation_calls(&self) -> usize {
        let state = self.state.lock().await;
        state
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, count)| *count)
            .sum()
    }

    pub async fn reset_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.lock().await;
        let mut shards = state.shards.clone();
        shards.sort_by(|a, b| a.id.cmp(&b.id));
        ClusterSnapshot {
            shards,
            partitioned_databases: state
                .databases
                .iter()
                .filter(|(_, partitioned)| **partitioned)
                .map(|(name, _)| name.clone())
                .collect(),
            shard_keys: state
                .collections
                .iter()
                .filter_map(|(ns, coll)| coll.shard_key.clone().map(|key| (ns.clone(), key)))
                .collect(),
            indexes: state
                .collections
                .iter()
                .map(|(ns, coll)| {
                    let mut names = coll
                        .indexes
                        .iter()
                        .map(|i| i.name.clone())
                        .collect::<Vec<_>>();
                    names.sort();
                    (ns.clone(), names)
                })
                .collect(),
        }
    }

    async fn enter(&self, op: ControlOp) -> Result<tokio::sync::MutexGuard<'_, SimState>> {
        let mut state = self.state.lock().await;
        *state.calls.entry(op).or_default() += 1;
        if !state.available {
            return Err(BootstrapError::Unavailable(format!(
                "simulated router is not reachable ({op})"
            )));
        }
        if let Some(err) = state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn ping(&self) -> Result<()> {
        self.enter(ControlOp::Ping).await.map(|_| ())
    }

    async fn list_shards(&self) -> Result<Vec<ShardMember>> {
        let state = self.enter(ControlOp::ListShards).await?;
        Ok(state.shards.clone())
    }

    async fn add_shard(&self, spec: &ShardSpec) -> Result<()> {
        let mut state = self.enter(ControlOp::AddShard).await?;
        let hosts = spec.host_set();
        if let Some(existing) = state.shards.iter().find(|member| {
            spec.shard_id() == Some(member.id.as_str()) || member.host_set() == hosts
        }) {
            if spec.shard_id().is_some_and(|id| id != existing.id) {
                return Err(BootstrapError::command(
                    96,
                    "OperationFailed",
                    format!("hosts of {spec} belong to a different shard '{}'", existing.id),
                ));
            }
            return Err(BootstrapError::command(
                11000,
                "DuplicateKey",
                format!("shard '{}' is already a member of the cluster", existing.id),
            ));
        }
        let id = match spec.shard_id() {
            Some(id) => id.to_string(),
            None => format!("shard{:04}", state.shards.len()),
        };
        state.shards.push(ShardMember {
            id,
            host: spec.to_string(),
        });
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let state = self.enter(ControlOp::ListDatabases).await?;
        Ok(state
            .databases
            .iter()
            .map(|(name, partitioned)| DatabaseInfo {
                name: name.clone(),
                partitioned: *partitioned,
            })
            .collect())
    }

    async fn enable_partitioning(&self, database: &str) -> Result<()> {
        let mut state = self.enter(ControlOp::EnablePartitioning).await?;
        if state.shards.is_empty() {
            return Err(BootstrapError::command(
                70,
                "ShardNotFound",
                format!("cannot enable sharding for '{database}': no shards registered"),
            ));
        }
        if state.databases.get(database).copied().unwrap_or(false) {
            return Err(BootstrapError::command(
                23,
                "AlreadyInitialized",
                format!("sharding already enabled for database {database}"),
            ));
        }
        state.databases.insert(database.to_string(), true);
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        let state = self.enter(ControlOp::ListCollections).await?;
        Ok(state
            .collections
            .iter()
            .filter(|(ns, _)| ns.database() == database)
            .map(|(ns, coll)| CollectionInfo {
                namespace: ns.clone(),
                shard_key: coll.shard_key.clone(),
            })
            .collect())
    }

    async fn create_collection(&self, namespace: &Namespace) -> Result<()> {
        let mut state = self.enter(ControlOp::CreateCollection).await?;
        if state.collections.contains_key(namespace) {
            return Err(BootstrapError::command(
                48,
                "NamespaceExists",
                format!("Collection {namespace} already exists."),
            ));
        }
        state.ensure_collection(namespace);
        Ok(())
    }

    async fn shard_collection(&self, namespace: &Namespace, key: &KeyPattern) -> Result<()> {
        let mut state = self.enter(ControlOp::ShardCollection).await?;
        if !state
            .databases
            .get(namespace.database())
            .copied()
            .unwrap_or(false)
        {
            return Err(BootstrapError::command(
                20,
                "IllegalOperation",
                format!("sharding not enabled for db {}", namespace.database()),
            ));
        }

        let collection = state.ensure_collection(namespace);
        match &collection.shard_key {
            Some(existing) if existing == key => {
                return Err(BootstrapError::command(
                    20,
                    "IllegalOperation",
                    format!("collection {namespace} already sharded"),
                ));
            }
            Some(existing) => {
                return Err(BootstrapError::command(
                    20,
                    "IllegalOperation",
                    format!(
                        "collection {namespace} already sharded with different key {existing}"
                    ),
                ));
            }
            None => {}
        }

        collection.shard_key = Some(key.clone());
        let name = key.default_index_name();
        if !collection.indexes.iter().any(|i| i.keys == *key) {
            collection.indexes.push(IndexInfo {
                name,
                keys: key.clone(),
                unique: false,
            });
        }
        Ok(())
    }

    async fn list_indexes(&self, namespace: &Namespace) -> Result<Vec<IndexInfo>> {
        let state = self.enter(ControlOp::ListIndexes).await?;
        state
            .collections
            .get(namespace)
            .map(|coll| coll.indexes.clone())
            .ok_or_else(|| {
                BootstrapError::command(
                    26,
                    "NamespaceNotFound",
                    format!("ns does not exist: {namespace}"),
                )
            })
    }

    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> Result<()> {
        let mut state = self.enter(ControlOp::CreateIndex).await?;
        let collection = state.ensure_collection(namespace);
        let name = index.resolved_name();

        if let Some(existing) = collection.indexes.iter().find(|i| i.name == name) {
            if existing.keys != index.keys {
                return Err(BootstrapError::command(
                    86,
                    "IndexKeySpecsConflict",
                    format!(
                        "An existing index has the same name as the requested index but different key: {name}"
                    ),
                ));
            }
            if existing.unique != index.unique {
                return Err(BootstrapError::command(
                    85,
                    "IndexOptionsConflict",
                    format!("Index with name: {name} already exists with different options"),
                ));
            }
            return Ok(());
        }
        if let Some(existing) = collection.indexes.iter().find(|i| i.keys == index.keys) {
            return Err(BootstrapError::command(
                85,
                "IndexOptionsConflict",
                format!(
                    "Index already exists with a different name: {}",
                    existing.name
                ),
            ));
        }

        collection.indexes.push(IndexInfo {
            name,
            keys: index.keys.clone(),
            unique: index.unique,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, classify_error, classify_registration_error};

    fn ns(raw: &str) -> Namespace {
        Namespace::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn duplicate_shard_registration_is_rejected_as_already_configured() {
        let plane = InMemoryControlPlane::new();
        let spec = ShardSpec::parse("shard1ReplSet/shard1:27018").unwrap();
        plane.add_shard(&spec).await.unwrap();

        let err = plane.add_shard(&spec).await.unwrap_err();
        assert_eq!(classify_registration_error(&err), ErrorKind::AlreadyConfigured);
        assert_eq!(plane.calls(ControlOp::AddShard).await, 2);
        assert_eq!(plane.list_shards().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_hosts_under_another_shard_id_are_a_conflict() {
        let plane = InMemoryControlPlane::new();
        plane
            .add_shard(&ShardSpec::parse("rsB/h:1").unwrap())
            .await
            .unwrap();

        let err = plane
            .add_shard(&ShardSpec::parse("rsA/h:1").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            classify_registration_error(&err),
            ErrorKind::ConfigurationConflict
        );
    }

    #[tokio::test]
    async fn enabling_partitioning_requires_a_shard() {
        let plane = InMemoryControlPlane::new();
        assert!(plane.enable_partitioning("banking").await.is_err());

        plane
            .add_shard(&ShardSpec::parse("rs/h:1").unwrap())
            .await
            .unwrap();
        plane.enable_partitioning("banking").await.unwrap();
        let err = plane.enable_partitioning("banking").await.unwrap_err();
        assert_eq!(classify_error(&err), ErrorKind::AlreadyConfigured);
    }

    #[tokio::test]
    async fn resharding_with_a_different_key_is_a_conflict() {
        let plane = InMemoryControlPlane::new();
        plane
            .add_shard(&ShardSpec::parse("rs/h:1").unwrap())
            .await
            .unwrap();
        plane.enable_partitioning("banking").await.unwrap();
        let accounts = ns("banking.accounts");
        plane
            .shard_collection(&accounts, &KeyPattern::single("accountNumber", KeyDirection::Hashed))
            .await
            .unwrap();

        let err = plane
            .shard_collection(&accounts, &KeyPattern::single("userId", KeyDirection::Ascending))
            .await
            .unwrap_err();
        assert_eq!(classify_error(&err), ErrorKind::ConfigurationConflict);

        let indexes = plane.list_indexes(&accounts).await.unwrap();
        assert!(indexes.iter().any(|i| i.name == "accountNumber_hashed"));
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let plane = InMemoryControlPlane::new();
        plane
            .fail_next(ControlOp::Ping, BootstrapError::Unavailable("booting".into()))
            .await;
        assert!(plane.ping().await.is_err());
        assert!(plane.ping().await.is_ok());
        assert_eq!(plane.calls(ControlOp::Ping).await, 2);
    }

    #[tokio::test]
    async fn unavailable_router_rejects_everything() {
        let plane = InMemoryControlPlane::new();
        plane.set_available(false).await;
        let err = plane.list_shards().await.unwrap_err();
        assert_eq!(classify_error(&err), ErrorKind::TransientUnavailable);
    }

    #[tokio::test]
    async fn list_indexes_on_missing_collection_fails() {
        let plane = InMemoryControlPlane::new();
        assert!(plane.list_indexes(&ns("banking.users")).await.is_err());
        plane.create_collection(&ns("banking.users")).await.unwrap();
        let indexes = plane.list_indexes(&ns("banking.users")).await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "_id_");
    }
}
