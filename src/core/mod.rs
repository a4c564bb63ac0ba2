pub mod classify;
pub mod error;
pub mod types;

pub use classify::{ErrorKind, classify_error, classify_registration_error};
pub use error::{BootstrapError, Result};
pub use types::{
    CollectionInfo, DatabaseInfo, IndexInfo, IndexSpec, KeyDirection, KeyPattern, Namespace,
    ShardMember, ShardSpec,
};
