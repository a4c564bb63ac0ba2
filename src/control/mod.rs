//! Control-plane seam.
//!
//! Everything the bootstrapper knows about the cluster goes through
//! [`ControlPlane`]. Two adapters ship with the crate: an in-memory simulated
//! cluster used by tests and `--simulate`, and a JSON command gateway client.

pub mod http;
pub mod in_memory;

use crate::core::{
    CollectionInfo, DatabaseInfo, IndexInfo, IndexSpec, KeyPattern, Namespace, Result,
    ShardMember, ShardSpec,
};
use async_trait::async_trait;
use std::fmt;

pub use http::HttpControlPlane;
pub use in_memory::{ClusterSnapshot, InMemoryControlPlane};

/// Administrative operations exposed by the cluster router.
///
/// Query operations never mutate. Mutating operations are attempted exactly
/// once per call; callers own any retry decision.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Checks that the endpoint answers commands.
    async fn ping(&self) -> Result<()>;

    /// Lists registered shard members.
    async fn list_shards(&self) -> Result<Vec<ShardMember>>;

    /// Registers a shard member.
    async fn add_shard(&self, spec: &ShardSpec) -> Result<()>;

    /// Lists databases known to the router along with their partitioning flag.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Enables partitioning for a logical database.
    async fn enable_partitioning(&self, database: &str) -> Result<()>;

    /// Lists collections of a database with their shard keys.
    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>>;

    /// Creates a collection explicitly.
    async fn create_collection(&self, namespace: &Namespace) -> Result<()>;

    /// Declares the partition key of a collection.
    async fn shard_collection(&self, namespace: &Namespace, key: &KeyPattern) -> Result<()>;

    /// Lists indexes of a collection.
    async fn list_indexes(&self, namespace: &Namespace) -> Result<Vec<IndexInfo>>;

    /// Creates a secondary index.
    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> Result<()>;
}

/// Operation identifiers, used for call accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlOp {
    Ping,
    ListShards,
    AddShard,
    ListDatabases,
    EnablePartitioning,
    ListCollections,
    CreateCollection,
    ShardCollection,
    ListIndexes,
    CreateIndex,
}

impl ControlOp {
    /// Whether the operation changes cluster state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::AddShard
                | Self::EnablePartitioning
                | Self::CreateCollection
                | Self::ShardCollection
                | Self::CreateIndex
        )
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ping => "ping",
            Self::ListShards => "listShards",
            Self::AddShard => "addShard",
            Self::ListDatabases => "listDatabases",
            Self::EnablePartitioning => "enableSharding",
            Self::ListCollections => "listCollections",
            Self::CreateCollection => "create",
            Self::ShardCollection => "shardCollection",
            Self::ListIndexes => "listIndexes",
            Self::CreateIndex => "createIndexes",
        };
        write!(f, "{name}")
    }
}
