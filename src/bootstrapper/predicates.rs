//! Idempotency checks: pure functions over state queried from the control
//! plane. None of them perform I/O.

use crate::core::{
    CollectionInfo, DatabaseInfo, IndexInfo, IndexSpec, KeyDirection, KeyPattern, Namespace,
    ShardMember, ShardSpec,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardRegistration {
    Absent,
    Registered,
    /// The declared hosts are registered under another shard id.
    Conflicts(String),
}

/// Looks up a declared shard among the registered members.
///
/// A matching replica set id means registered. Otherwise a member listing the
/// same hosts (in any order) means registered when the declaration carries no
/// id of its own, and a conflict when the ids differ.
pub fn shard_registration(members: &[ShardMember], spec: &ShardSpec) -> ShardRegistration {
    if let Some(id) = spec.shard_id() {
        if members.iter().any(|member| member.id == id) {
            return ShardRegistration::Registered;
        }
    }

    let hosts = spec.host_set();
    match members.iter().find(|member| member.host_set() == hosts) {
        None => ShardRegistration::Absent,
        Some(_) if spec.shard_id().is_none() => ShardRegistration::Registered,
        Some(member) => ShardRegistration::Conflicts(member.id.clone()),
    }
}

pub fn partitioning_is_enabled(databases: &[DatabaseInfo], name: &str) -> bool {
    databases.iter().any(|db| db.name == name && db.partitioned)
}

pub fn collection_exists(collections: &[CollectionInfo], namespace: &Namespace) -> bool {
    collections.iter().any(|c| c.namespace == *namespace)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardKeyState {
    Absent,
    Matches,
    /// The collection is sharded on another key.
    Conflicts(KeyPattern),
}

/// Compares the declared shard key with the one in place, direction included.
pub fn shard_key_state(existing: Option<&KeyPattern>, desired: &KeyPattern) -> ShardKeyState {
    match existing {
        None => ShardKeyState::Absent,
        Some(key) if key == desired => ShardKeyState::Matches,
        Some(key) => ShardKeyState::Conflicts(key.clone()),
    }
}

/// Shard key currently set on `namespace`, if the collection is listed and sharded.
pub fn existing_shard_key<'a>(
    collections: &'a [CollectionInfo],
    namespace: &Namespace,
) -> Option<&'a KeyPattern> {
    collections
        .iter()
        .find(|c| c.namespace == *namespace)
        .and_then(|c| c.shard_key.as_ref())
}

fn is_hashed(keys: &KeyPattern) -> bool {
    keys.fields()
        .iter()
        .any(|(_, dir)| *dir == KeyDirection::Hashed)
}

/// Finds an existing index over the same field set.
///
/// Field order and ascending/descending direction are ignored; a hashed index
/// never matches an ordered one, so the shard key index built by the router
/// does not stand in for a declared ordered index on the same field.
pub fn find_matching_index<'a>(indexes: &'a [IndexInfo], spec: &IndexSpec) -> Option<&'a IndexInfo> {
    let wanted = spec.keys.field_set();
    let wanted_hashed = is_hashed(&spec.keys);
    indexes
        .iter()
        .find(|index| index.keys.field_set() == wanted && is_hashed(&index.keys) == wanted_hashed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(value: serde_json::Value) -> KeyPattern {
        KeyPattern::from_json(&value).unwrap()
    }

    fn index(name: &str, pattern: serde_json::Value, unique: bool) -> IndexInfo {
        IndexInfo {
            name: name.to_string(),
            keys: keys(pattern),
            unique,
        }
    }

    fn registration(members: &[ShardMember], raw: &str) -> ShardRegistration {
        shard_registration(members, &ShardSpec::parse(raw).unwrap())
    }

    #[test]
    fn shard_registered_by_id_or_hosts() {
        let members = vec![ShardMember {
            id: "shard1ReplSet".to_string(),
            host: "shard1ReplSet/shard1:27018".to_string(),
        }];
        assert_eq!(
            registration(&members, "shard1ReplSet/shard1:27018"),
            ShardRegistration::Registered
        );
        assert_eq!(
            registration(&members, "shard1ReplSet/shard1b:27018"),
            ShardRegistration::Registered
        );
        assert_eq!(
            registration(&members, "shard1:27018"),
            ShardRegistration::Registered
        );
        assert_eq!(
            registration(&members, "shard2ReplSet/shard2:27018"),
            ShardRegistration::Absent
        );
        assert_eq!(
            registration(&[], "shard1ReplSet/shard1:27018"),
            ShardRegistration::Absent
        );
    }

    #[test]
    fn same_hosts_under_another_id_conflict() {
        let members = vec![ShardMember {
            id: "rsB".to_string(),
            host: "rsB/h:1".to_string(),
        }];
        assert_eq!(
            registration(&members, "rsA/h:1"),
            ShardRegistration::Conflicts("rsB".to_string())
        );
    }

    #[test]
    fn partitioning_requires_flag() {
        let dbs = vec![
            DatabaseInfo {
                name: "banking".to_string(),
                partitioned: false,
            },
            DatabaseInfo {
                name: "audit".to_string(),
                partitioned: true,
            },
        ];
        assert!(!partitioning_is_enabled(&dbs, "banking"));
        assert!(partitioning_is_enabled(&dbs, "audit"));
        assert!(!partitioning_is_enabled(&dbs, "missing"));
    }

    #[test]
    fn shard_key_states() {
        let hashed = keys(json!({"accountNumber": "hashed"}));
        let ranged = keys(json!({"accountNumber": 1}));
        assert_eq!(shard_key_state(None, &hashed), ShardKeyState::Absent);
        assert_eq!(shard_key_state(Some(&hashed), &hashed), ShardKeyState::Matches);
        assert_eq!(
            shard_key_state(Some(&ranged), &hashed),
            ShardKeyState::Conflicts(ranged.clone())
        );
    }

    #[test]
    fn existing_shard_key_looks_up_namespace() {
        let accounts = Namespace::parse("banking.accounts").unwrap();
        let collections = vec![CollectionInfo {
            namespace: accounts.clone(),
            shard_key: Some(keys(json!({"accountNumber": "hashed"}))),
        }];
        assert!(existing_shard_key(&collections, &accounts).is_some());
        assert!(
            existing_shard_key(&collections, &Namespace::parse("banking.users").unwrap())
                .is_none()
        );
        assert!(collection_exists(&collections, &accounts));
    }

    #[test]
    fn index_match_is_by_field_set() {
        let indexes = vec![
            index("_id_", json!({"_id": 1}), true),
            index("createdAt_-1_toAccount_1", json!({"createdAt": -1, "toAccount": 1}), false),
            index("accountNumber_hashed", json!({"accountNumber": "hashed"}), false),
        ];

        let reordered = IndexSpec::new(keys(json!({"toAccount": 1, "createdAt": -1})));
        assert!(find_matching_index(&indexes, &reordered).is_some());

        let flipped = IndexSpec::new(keys(json!({"toAccount": -1, "createdAt": 1})));
        assert!(find_matching_index(&indexes, &flipped).is_some());

        let ordered_account = IndexSpec::new(keys(json!({"accountNumber": 1}))).unique();
        assert!(find_matching_index(&indexes, &ordered_account).is_none());

        let subset = IndexSpec::new(keys(json!({"toAccount": 1})));
        assert!(find_matching_index(&indexes, &subset).is_none());
    }
}
