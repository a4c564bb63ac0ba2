use super::{ControlOp, ControlPlane};
use crate::connection::config::BootstrapConfig;
use crate::core::{
    BootstrapError, CollectionInfo, DatabaseInfo, IndexInfo, IndexSpec, KeyPattern, Namespace,
    Result, ShardMember, ShardSpec,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Control plane reached through a JSON command gateway.
///
/// Each operation posts one command document to `{endpoint}/admin/command`
/// and reads back `{"ok": 1, ...}` or
/// `{"ok": 0, "code": n, "codeName": "...", "errmsg": "..."}`.
pub struct HttpControlPlane {
    client: reqwest::Client,
    command_url: String,
}

#[derive(Deserialize)]
struct ShardDocument {
    #[serde(rename = "_id")]
    id: String,
    host: String,
}

#[derive(Deserialize)]
struct ListShardsReply {
    #[serde(default)]
    shards: Vec<ShardDocument>,
}

#[derive(Deserialize)]
struct DatabaseDocument {
    name: String,
    #[serde(default)]
    partitioned: bool,
}

#[derive(Deserialize)]
struct ListDatabasesReply {
    #[serde(default)]
    databases: Vec<DatabaseDocument>,
}

#[derive(Deserialize)]
struct Cursor<T> {
    #[serde(rename = "firstBatch", default = "Vec::new")]
    first_batch: Vec<T>,
}

#[derive(Deserialize)]
struct CursorReply<T> {
    cursor: Cursor<T>,
}

#[derive(Deserialize)]
struct CollectionDocument {
    name: String,
    #[serde(rename = "shardKey", default)]
    shard_key: Option<KeyPattern>,
}

/// Index keys stay raw here: live collections may carry text, geo or wildcard
/// indexes whose key values are not orderings.
#[derive(Deserialize)]
struct IndexDocument {
    name: String,
    key: Map<String, Value>,
    #[serde(default)]
    unique: bool,
}

impl IndexDocument {
    /// Converts a listed index, or `None` for key types no declared index can
    /// take (text, 2d, 2dsphere, wildcard and the like).
    fn into_index_info(self, namespace: &Namespace) -> Option<IndexInfo> {
        match KeyPattern::from_json_map(&self.key) {
            Ok(keys) => Some(IndexInfo {
                name: self.name,
                keys,
                unique: self.unique,
            }),
            Err(err) => {
                warn!(
                    namespace = %namespace,
                    index = %self.name,
                    error = %err,
                    "ignoring listed index with unsupported key type"
                );
                None
            }
        }
    }
}

impl HttpControlPlane {
    /// Builds a client for the configured gateway.
    pub fn new(config: &BootstrapConfig) -> Result<Self> {
        config.validate().map_err(BootstrapError::Config)?;

        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BootstrapError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            command_url: config.command_url(),
        })
    }

    async fn run_command(&self, op: ControlOp, command: Value) -> Result<Value> {
        debug!(%op, url = %self.command_url, "posting admin command");

        let response = self
            .client
            .post(&self.command_url)
            .json(&command)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        let reply: Value = serde_json::from_slice(&body).map_err(|_| {
            if status.is_server_error() {
                BootstrapError::Unavailable(format!("{op}: gateway answered HTTP {status}"))
            } else {
                BootstrapError::Transport(format!(
                    "{op}: gateway answered HTTP {status} with a non-JSON body"
                ))
            }
        })?;

        if reply_ok(&reply) {
            return Ok(reply);
        }
        Err(command_error(op, &reply, status))
    }

    async fn run_typed<T: for<'de> Deserialize<'de>>(
        &self,
        op: ControlOp,
        command: Value,
    ) -> Result<T> {
        let reply = self.run_command(op, command).await?;
        serde_json::from_value(reply)
            .map_err(|e| BootstrapError::Transport(format!("{op}: malformed reply: {e}")))
    }
}

fn reply_ok(reply: &Value) -> bool {
    match reply.get("ok") {
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::Bool(ok)) => *ok,
        _ => false,
    }
}

fn command_error(op: ControlOp, reply: &Value, status: reqwest::StatusCode) -> BootstrapError {
    let code = reply
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok());
    let code_name = reply
        .get("codeName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = reply
        .get("errmsg")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{op} failed (HTTP {status})"));
    BootstrapError::Command {
        code,
        code_name,
        message,
    }
}

fn map_transport_error(err: reqwest::Error) -> BootstrapError {
    if err.is_connect() || err.is_timeout() {
        BootstrapError::Unavailable(err.to_string())
    } else {
        BootstrapError::Transport(err.to_string())
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn ping(&self) -> Result<()> {
        self.run_command(ControlOp::Ping, json!({"ping": 1}))
            .await
            .map(|_| ())
    }

    async fn list_shards(&self) -> Result<Vec<ShardMember>> {
        let reply: ListShardsReply = self
            .run_typed(ControlOp::ListShards, json!({"listShards": 1}))
            .await?;
        Ok(reply
            .shards
            .into_iter()
            .map(|doc| ShardMember {
                id: doc.id,
                host: doc.host,
            })
            .collect())
    }

    async fn add_shard(&self, spec: &ShardSpec) -> Result<()> {
        self.run_command(ControlOp::AddShard, json!({"addShard": spec.to_string()}))
            .await
            .map(|_| ())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let reply: ListDatabasesReply = self
            .run_typed(ControlOp::ListDatabases, json!({"listDatabases": 1}))
            .await?;
        Ok(reply
            .databases
            .into_iter()
            .map(|doc| DatabaseInfo {
                name: doc.name,
                partitioned: doc.partitioned,
            })
            .collect())
    }

    async fn enable_partitioning(&self, database: &str) -> Result<()> {
        self.run_command(
            ControlOp::EnablePartitioning,
            json!({"enableSharding": database}),
        )
        .await
        .map(|_| ())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        let reply: CursorReply<CollectionDocument> = self
            .run_typed(
                ControlOp::ListCollections,
                json!({"listCollections": 1, "$db": database}),
            )
            .await?;
        reply
            .cursor
            .first_batch
            .into_iter()
            .map(|doc| {
                Ok(CollectionInfo {
                    namespace: Namespace::new(database, doc.name)?,
                    shard_key: doc.shard_key,
                })
            })
            .collect()
    }

    async fn create_collection(&self, namespace: &Namespace) -> Result<()> {
        self.run_command(
            ControlOp::CreateCollection,
            json!({"create": namespace.collection(), "$db": namespace.database()}),
        )
        .await
        .map(|_| ())
    }

    async fn shard_collection(&self, namespace: &Namespace, key: &KeyPattern) -> Result<()> {
        self.run_command(
            ControlOp::ShardCollection,
            json!({"shardCollection": namespace.to_string(), "key": key.to_json()}),
        )
        .await
        .map(|_| ())
    }

    async fn list_indexes(&self, namespace: &Namespace) -> Result<Vec<IndexInfo>> {
        let reply: CursorReply<IndexDocument> = self
            .run_typed(
                ControlOp::ListIndexes,
                json!({"listIndexes": namespace.collection(), "$db": namespace.database()}),
            )
            .await?;
        Ok(reply
            .cursor
            .first_batch
            .into_iter()
            .filter_map(|doc| doc.into_index_info(namespace))
            .collect())
    }

    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> Result<()> {
        self.run_command(
            ControlOp::CreateIndex,
            json!({
                "createIndexes": namespace.collection(),
                "$db": namespace.database(),
                "indexes": [{
                    "key": index.keys.to_json(),
                    "name": index.resolved_name(),
                    "unique": index.unique,
                }],
            }),
        )
        .await
        .map(|_| ())
    }
}
