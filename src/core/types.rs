use super::{BootstrapError, Result};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A shard member in connection-string form: `rs/host:port[,host:port...]`
/// or a bare `host:port` list for a standalone shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShardSpec {
    replica_set: Option<String>,
    hosts: Vec<String>,
}

impl ShardSpec {
    /// Parses a shard connection string.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (replica_set, host_list) = match raw.split_once('/') {
            Some((name, hosts)) => {
                if name.trim().is_empty() {
                    return Err(BootstrapError::InvalidTopology(format!(
                        "Shard '{raw}' has an empty replica set name"
                    )));
                }
                (Some(name.trim().to_string()), hosts)
            }
            None => (None, raw),
        };

        let mut hosts = Vec::new();
        for host in host_list.split(',') {
            let host = host.trim();
            if host.is_empty() {
                continue;
            }
            let valid_port = host
                .rsplit_once(':')
                .map(|(name, port)| !name.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid_port {
                return Err(BootstrapError::InvalidTopology(format!(
                    "Shard host '{host}' must be in host:port form"
                )));
            }
            hosts.push(host.to_string());
        }
        if hosts.is_empty() {
            return Err(BootstrapError::InvalidTopology(format!(
                "Shard '{raw}' lists no hosts"
            )));
        }

        Ok(Self { replica_set, hosts })
    }

    /// The replica set name, used by the control plane as the shard id.
    pub fn shard_id(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Hosts as an order-independent set.
    pub fn host_set(&self) -> BTreeSet<&str> {
        self.hosts.iter().map(String::as_str).collect()
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.replica_set {
            write!(f, "{name}/")?;
        }
        write!(f, "{}", self.hosts.join(","))
    }
}

impl FromStr for ShardSpec {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShardSpec {
    type Error = BootstrapError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ShardSpec> for String {
    fn from(spec: ShardSpec) -> Self {
        spec.to_string()
    }
}

/// A fully qualified collection name: `database.collection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let database = database.into();
        let collection = collection.into();
        if database.trim().is_empty() || database.contains('.') {
            return Err(BootstrapError::InvalidTopology(format!(
                "Invalid database name '{database}'"
            )));
        }
        if collection.trim().is_empty() {
            return Err(BootstrapError::InvalidTopology(format!(
                "Collection name in database '{database}' must not be empty"
            )));
        }
        Ok(Self {
            database,
            collection,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let (database, collection) = raw.split_once('.').ok_or_else(|| {
            BootstrapError::InvalidTopology(format!(
                "Namespace '{raw}' must be in database.collection form"
            ))
        })?;
        Self::new(database, collection)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl TryFrom<String> for Namespace {
    type Error = BootstrapError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Ascending,
    Descending,
    Hashed,
}

impl KeyDirection {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) if n.as_f64() == Some(1.0) => Ok(Self::Ascending),
            Value::Number(n) if n.as_f64() == Some(-1.0) => Ok(Self::Descending),
            Value::String(s) if s == "hashed" => Ok(Self::Hashed),
            other => Err(BootstrapError::InvalidTopology(format!(
                "Unsupported key direction {other}"
            ))),
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            Self::Ascending => Value::from(1),
            Self::Descending => Value::from(-1),
            Self::Hashed => Value::from("hashed"),
        }
    }
}

impl fmt::Display for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "1"),
            Self::Descending => write!(f, "-1"),
            Self::Hashed => write!(f, "hashed"),
        }
    }
}

/// Ordered index or shard key pattern, e.g. `{ accountNumber: "hashed" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    fields: Vec<(String, KeyDirection)>,
}

impl KeyPattern {
    pub fn new(fields: Vec<(String, KeyDirection)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(BootstrapError::InvalidTopology(
                "key pattern must name at least one field".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for (field, _) in &fields {
            if field.trim().is_empty() {
                return Err(BootstrapError::InvalidTopology(
                    "key pattern field names must not be empty".to_string(),
                ));
            }
            if !seen.insert(field.as_str()) {
                return Err(BootstrapError::InvalidTopology(format!(
                    "key pattern field '{field}' appears more than once"
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Single-field pattern.
    pub fn single(field: impl Into<String>, direction: KeyDirection) -> Self {
        Self {
            fields: vec![(field.into(), direction)],
        }
    }

    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        let fields = map
            .iter()
            .map(|(field, dir)| Ok((field.clone(), KeyDirection::from_json(dir)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            BootstrapError::InvalidTopology(format!("key pattern must be an object, got {value}"))
        })?;
        Self::from_json_map(map)
    }

    pub fn to_json(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(field, dir)| (field.clone(), dir.to_json()))
            .collect::<Map<_, _>>();
        Value::Object(map)
    }

    pub fn fields(&self) -> &[(String, KeyDirection)] {
        &self.fields
    }

    /// Field names ignoring order and direction.
    pub fn field_set(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|(f, _)| f.as_str()).collect()
    }

    /// Conventional generated index name, e.g. `fromAccount_1_createdAt_-1`.
    pub fn default_index_name(&self) -> String {
        self.fields
            .iter()
            .map(|(field, dir)| format!("{field}_{dir}"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .fields
            .iter()
            .map(|(field, dir)| match dir {
                KeyDirection::Hashed => format!("{field}: \"hashed\""),
                other => format!("{field}: {other}"),
            })
            .collect::<Vec<_>>();
        write!(f, "{{ {} }}", parts.join(", "))
    }
}

impl Serialize for KeyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, dir) in &self.fields {
            map.serialize_entry(field, &dir.to_json())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_json_map(&map).map_err(D::Error::custom)
    }
}

/// Declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: KeyPattern,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn new(keys: KeyPattern) -> Self {
        Self {
            keys,
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name, or the generated one.
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.keys.default_index_name())
    }
}

/// A registered shard as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMember {
    pub id: String,
    pub host: String,
}

impl ShardMember {
    /// Host portion of the member's connection string, as an order-independent set.
    pub fn host_set(&self) -> BTreeSet<&str> {
        let hosts = self
            .host
            .split_once('/')
            .map(|(_, hosts)| hosts)
            .unwrap_or(self.host.as_str());
        hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub partitioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub namespace: Namespace,
    pub shard_key: Option<KeyPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: KeyPattern,
    pub unique: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_replica_set_shard_spec() {
        let spec = ShardSpec::parse("shard1ReplSet/shard1:27018,shard1b:27018").unwrap();
        assert_eq!(spec.shard_id(), Some("shard1ReplSet"));
        assert_eq!(spec.hosts().len(), 2);
        assert_eq!(spec.to_string(), "shard1ReplSet/shard1:27018,shard1b:27018");
    }

    #[test]
    fn parses_standalone_shard_spec() {
        let spec = ShardSpec::parse("shard3:27018").unwrap();
        assert_eq!(spec.shard_id(), None);
        assert_eq!(spec.to_string(), "shard3:27018");
    }

    #[test]
    fn rejects_malformed_shard_specs() {
        assert!(ShardSpec::parse("/shard1:27018").is_err());
        assert!(ShardSpec::parse("rs/").is_err());
        assert!(ShardSpec::parse("rs/shard1").is_err());
        assert!(ShardSpec::parse("rs/shard1:notaport").is_err());
    }

    #[test]
    fn namespace_requires_both_parts() {
        let ns = Namespace::parse("banking.accounts").unwrap();
        assert_eq!(ns.database(), "banking");
        assert_eq!(ns.collection(), "accounts");
        assert!(Namespace::parse("banking").is_err());
        assert!(Namespace::parse(".accounts").is_err());
        assert!(Namespace::parse("banking.").is_err());
    }

    #[test]
    fn key_pattern_preserves_field_order() {
        let pattern: KeyPattern =
            serde_json::from_value(json!({"toAccount": 1, "createdAt": -1})).unwrap();
        assert_eq!(pattern.fields()[0].0, "toAccount");
        assert_eq!(pattern.fields()[1].1, KeyDirection::Descending);
        assert_eq!(pattern.default_index_name(), "toAccount_1_createdAt_-1");
        assert_eq!(
            serde_json::to_value(&pattern).unwrap(),
            json!({"toAccount": 1, "createdAt": -1})
        );
    }

    #[test]
    fn key_pattern_rejects_bad_directions_and_empties() {
        assert!(serde_json::from_value::<KeyPattern>(json!({"a": 2})).is_err());
        assert!(serde_json::from_value::<KeyPattern>(json!({"a": "text"})).is_err());
        assert!(serde_json::from_value::<KeyPattern>(json!({})).is_err());
    }

    #[test]
    fn hashed_key_pattern_display() {
        let pattern = KeyPattern::single("accountNumber", KeyDirection::Hashed);
        assert_eq!(pattern.to_string(), "{ accountNumber: \"hashed\" }");
    }

    #[test]
    fn index_spec_defaults() {
        let spec: IndexSpec = serde_json::from_value(json!({"keys": {"email": 1}, "unique": true}))
            .unwrap();
        assert!(spec.unique);
        assert_eq!(spec.resolved_name(), "email_1");
        assert_eq!(spec.clone().named("by_email").resolved_name(), "by_email");
    }

    #[test]
    fn shard_member_host_set_ignores_order() {
        let member = ShardMember {
            id: "rs".to_string(),
            host: "rs/b:1,a:1".to_string(),
        };
        let spec = ShardSpec::parse("rs/a:1,b:1").unwrap();
        assert_eq!(member.host_set(), spec.host_set());
    }
}
