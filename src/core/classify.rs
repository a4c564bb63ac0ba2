use super::BootstrapError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse category of a control-plane failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The effect already exists; not an error.
    AlreadyConfigured,
    /// The endpoint is not ready or not reachable.
    TransientUnavailable,
    /// The desired state contradicts the existing state. Never auto-resolved.
    ConfigurationConflict,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AlreadyConfigured => "already configured",
            Self::TransientUnavailable => "transient unavailable",
            Self::ConfigurationConflict => "configuration conflict",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

const ALREADY_CONFIGURED_CODES: &[i32] = &[
    23, // AlreadyInitialized
    48, // NamespaceExists
    68, // IndexAlreadyExists
];

const DUPLICATE_KEY: i32 = 11000;

const CONFLICT_CODES: &[i32] = &[
    85, // IndexOptionsConflict
    86, // IndexKeySpecsConflict
];

const UNAVAILABLE_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    13436, // NotPrimaryOrSecondary
];

const ILLEGAL_OPERATION: i32 = 20;

const CONFLICT_MARKERS: &[&str] = &["conflict", "different", "mismatch"];

const ALREADY_MARKERS: &[&str] = &[
    "already exists",
    "already enabled",
    "already sharded",
    "already a member",
    "already initialized",
];

/// Classifies a control-plane error into an [`ErrorKind`].
///
/// Conflict markers win over "already" markers so that an "already sharded
/// with a different key" reply is never absorbed as success.
pub fn classify_error(err: &BootstrapError) -> ErrorKind {
    match err {
        BootstrapError::Command { code, message, .. } => classify_command(*code, message),
        BootstrapError::Unavailable(_) | BootstrapError::Transport(_) => {
            ErrorKind::TransientUnavailable
        }
        _ => ErrorKind::Unknown,
    }
}

/// Classifies a failed shard registration.
///
/// The router rejects a second registration of a shard with a duplicate key
/// error on its shard registry. Everywhere else a duplicate key means data
/// violates a unique constraint (for example a unique index build), which is
/// a real failure, so [`classify_error`] never absorbs it.
pub fn classify_registration_error(err: &BootstrapError) -> ErrorKind {
    if let BootstrapError::Command { code, message, .. } = err {
        let lower = message.to_lowercase();
        let duplicate = *code == Some(DUPLICATE_KEY) || lower.contains("duplicate key");
        if duplicate && !CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
            return ErrorKind::AlreadyConfigured;
        }
    }
    classify_error(err)
}

fn classify_command(code: Option<i32>, message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let has_conflict_marker = CONFLICT_MARKERS.iter().any(|m| lower.contains(m));

    if let Some(code) = code {
        if CONFLICT_CODES.contains(&code) {
            return ErrorKind::ConfigurationConflict;
        }
        if UNAVAILABLE_CODES.contains(&code) {
            return ErrorKind::TransientUnavailable;
        }
        if code == ILLEGAL_OPERATION && lower.contains("already sharded") {
            return if has_conflict_marker {
                ErrorKind::ConfigurationConflict
            } else {
                ErrorKind::AlreadyConfigured
            };
        }
        if ALREADY_CONFIGURED_CODES.contains(&code) && !has_conflict_marker {
            return ErrorKind::AlreadyConfigured;
        }
    }

    if has_conflict_marker {
        return ErrorKind::ConfigurationConflict;
    }
    if ALREADY_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorKind::AlreadyConfigured;
    }
    ErrorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_already_configured() {
        let err = BootstrapError::command(23, "AlreadyInitialized", "sharding enabled");
        assert_eq!(classify_error(&err), ErrorKind::AlreadyConfigured);

        let err = BootstrapError::command(48, "NamespaceExists", "collection exists");
        assert_eq!(classify_error(&err), ErrorKind::AlreadyConfigured);
    }

    #[test]
    fn index_conflict_codes_are_conflicts() {
        let err = BootstrapError::command(
            85,
            "IndexOptionsConflict",
            "Index already exists with a different name",
        );
        assert_eq!(classify_error(&err), ErrorKind::ConfigurationConflict);
    }

    #[test]
    fn already_sharded_with_different_key_is_a_conflict() {
        let same = BootstrapError::command(20, "IllegalOperation", "collection already sharded");
        assert_eq!(classify_error(&same), ErrorKind::AlreadyConfigured);

        let different = BootstrapError::command(
            20,
            "IllegalOperation",
            "collection already sharded with different key",
        );
        assert_eq!(classify_error(&different), ErrorKind::ConfigurationConflict);
    }

    #[test]
    fn messages_without_codes_are_classified_by_substring() {
        let err = BootstrapError::command_message("Shard 'shard1ReplSet' ALREADY EXISTS");
        assert_eq!(classify_error(&err), ErrorKind::AlreadyConfigured);

        let err = BootstrapError::command_message("E11000 duplicate key error");
        assert_eq!(classify_error(&err), ErrorKind::Unknown);

        let err = BootstrapError::command_message("something else went wrong");
        assert_eq!(classify_error(&err), ErrorKind::Unknown);
    }

    #[test]
    fn duplicate_key_is_only_absorbed_for_shard_registration() {
        let index_build = BootstrapError::command(
            11000,
            "DuplicateKey",
            "Index build failed: E11000 duplicate key error collection: banking.users index: email_1 dup key: { email: \"a@b.c\" }",
        );
        assert_eq!(classify_error(&index_build), ErrorKind::Unknown);

        let registration = BootstrapError::command(
            11000,
            "DuplicateKey",
            "E11000 duplicate key error collection: config.shards",
        );
        assert_eq!(
            classify_registration_error(&registration),
            ErrorKind::AlreadyConfigured
        );
        assert_eq!(
            classify_registration_error(&BootstrapError::command_message("E11000 duplicate key error")),
            ErrorKind::AlreadyConfigured
        );
        assert_eq!(
            classify_registration_error(&BootstrapError::Transport("reset".into())),
            ErrorKind::TransientUnavailable
        );
    }

    #[test]
    fn transport_failures_are_transient() {
        let err = BootstrapError::Transport("connection refused".to_string());
        assert_eq!(classify_error(&err), ErrorKind::TransientUnavailable);

        let err = BootstrapError::command(91, "ShutdownInProgress", "shutting down");
        assert_eq!(classify_error(&err), ErrorKind::TransientUnavailable);
    }

    #[test]
    fn local_errors_are_unknown() {
        assert_eq!(
            classify_error(&BootstrapError::SessionClosed),
            ErrorKind::Unknown
        );
    }
}
