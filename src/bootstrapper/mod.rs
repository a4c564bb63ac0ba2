pub mod predicates;

use crate::connection::AdminSession;
use crate::core::{
    BootstrapError, ErrorKind, IndexSpec, KeyPattern, Namespace, ShardSpec, classify_error,
    classify_registration_error,
};
use crate::plan::{BootstrapPlan, FailureAction, FailurePolicy, Step, StepKind, StepTarget};
use crate::report::{RunReport, StepOutcome, StepResult};
use chrono::Utc;
use predicates::{
    ShardKeyState, ShardRegistration, collection_exists, existing_shard_key, find_matching_index,
    partitioning_is_enabled, shard_key_state, shard_registration,
};
use std::collections::HashSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

type StepObserver = Box<dyn Fn(&StepResult) + Send + Sync>;

/// Why a step did not reach its desired state.
#[derive(Debug, Clone)]
struct StepFailure {
    reason: String,
    kind: ErrorKind,
}

impl StepFailure {
    fn from_error(context: &str, err: &BootstrapError) -> Self {
        Self::classified(context, err, classify_error(err))
    }

    fn classified(context: &str, err: &BootstrapError, kind: ErrorKind) -> Self {
        Self {
            reason: format!("{context}: {err}"),
            kind,
        }
    }
}

type StepAttempt = std::result::Result<StepOutcome, StepFailure>;

/// Applies a bootstrap plan step by step against one administrative session.
///
/// Each step first queries current state and skips the mutation when the
/// effect already exists. A mutation failing with an "already done" signal
/// is downgraded to `AlreadyApplied`. Other failures are recorded and either
/// stop the run or let it continue according to the [`FailurePolicy`].
pub struct ClusterBootstrapper {
    policy: FailurePolicy,
    observer: Option<StepObserver>,
}

impl Default for ClusterBootstrapper {
    fn default() -> Self {
        Self::new(FailurePolicy::default())
    }
}

impl ClusterBootstrapper {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            observer: None,
        }
    }

    /// Registers a callback invoked with each step result as soon as it is known.
    pub fn with_observer(mut self, observer: impl Fn(&StepResult) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Runs every step of `plan` in order, once.
    pub async fn run(&self, session: &mut AdminSession, plan: &BootstrapPlan) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("bootstrap_run", %run_id, steps = plan.len());
        self.run_steps(run_id, session, plan).instrument(span).await
    }

    async fn run_steps(
        &self,
        run_id: Uuid,
        session: &mut AdminSession,
        plan: &BootstrapPlan,
    ) -> RunReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(plan.len());
        let mut partitioned = HashSet::new();
        let mut skipped = 0;
        let mut aborted = false;

        info!(endpoint = session.endpoint(), "bootstrap run started");

        for (position, step) in plan.steps().iter().enumerate() {
            let attempt = self.attempt(session, step, &partitioned).await;
            let result = match attempt {
                Ok(outcome) => {
                    if let StepTarget::Database(name) = step.target() {
                        partitioned.insert(name.clone());
                    }
                    info!(
                        step = position + 1,
                        kind = %step.kind(),
                        target = %step.describe(),
                        outcome = ?outcome,
                        "step finished"
                    );
                    StepResult {
                        step: step.clone(),
                        outcome,
                        error_kind: None,
                    }
                }
                Err(failure) => StepResult {
                    step: step.clone(),
                    outcome: StepOutcome::Failed(failure.reason),
                    error_kind: Some(failure.kind),
                },
            };

            if let Some(observer) = &self.observer {
                observer(&result);
            }

            let action = result
                .error_kind
                .map(|kind| self.policy.decide(step.kind(), kind));
            results.push(result);

            match action {
                Some(FailureAction::Abort) => {
                    skipped = plan.len() - position - 1;
                    aborted = true;
                    error!(
                        step = position + 1,
                        kind = %step.kind(),
                        target = %step.describe(),
                        skipped,
                        "fatal step failure, aborting run"
                    );
                    break;
                }
                Some(FailureAction::Continue) => {
                    warn!(
                        step = position + 1,
                        kind = %step.kind(),
                        target = %step.describe(),
                        "step failed, continuing with next step"
                    );
                }
                None => {}
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
            skipped,
            aborted,
        };
        info!(
            applied = report.applied(),
            already_applied = report.already_applied(),
            failed = report.failed(),
            skipped = report.skipped,
            aborted = report.aborted,
            "bootstrap run finished"
        );
        report
    }

    async fn attempt(
        &self,
        session: &mut AdminSession,
        step: &Step,
        partitioned: &HashSet<String>,
    ) -> StepAttempt {
        match step.target() {
            StepTarget::Shard(spec) => Self::add_shard(session, spec).await,
            StepTarget::Database(name) => Self::enable_partitioning(session, name).await,
            StepTarget::Collection(namespace) => Self::create_collection(session, namespace).await,
            StepTarget::PartitionKey { namespace, key } => {
                if !partitioned.contains(namespace.database()) {
                    return Err(StepFailure {
                        reason: format!(
                            "partitioning not confirmed for database {}",
                            namespace.database()
                        ),
                        kind: ErrorKind::Unknown,
                    });
                }
                Self::declare_partition_key(session, namespace, key).await
            }
            StepTarget::Index { namespace, index } => {
                Self::create_index(session, namespace, index).await
            }
        }
    }

    async fn add_shard(session: &mut AdminSession, spec: &ShardSpec) -> StepAttempt {
        let members = session
            .plane()
            .map_err(|e| StepFailure::from_error("listShards", &e))?
            .list_shards()
            .await
            .map_err(|e| StepFailure::from_error("listShards", &e))?;
        match shard_registration(&members, spec) {
            ShardRegistration::Registered => return Ok(StepOutcome::AlreadyApplied),
            ShardRegistration::Conflicts(existing) => {
                return Err(StepFailure {
                    reason: format!(
                        "hosts of {spec} are already registered as shard {existing}, refusing to register them again"
                    ),
                    kind: ErrorKind::ConfigurationConflict,
                });
            }
            ShardRegistration::Absent => {}
        }

        let result = session
            .plane()
            .map_err(|e| StepFailure::from_error("addShard", &e))?
            .add_shard(spec)
            .await;
        absorb("addShard", StepKind::AddShardMember, result)
    }

    async fn enable_partitioning(session: &mut AdminSession, database: &str) -> StepAttempt {
        let databases = session
            .plane()
            .map_err(|e| StepFailure::from_error("listDatabases", &e))?
            .list_databases()
            .await
            .map_err(|e| StepFailure::from_error("listDatabases", &e))?;
        if partitioning_is_enabled(&databases, database) {
            return Ok(StepOutcome::AlreadyApplied);
        }

        let result = session
            .plane()
            .map_err(|e| StepFailure::from_error("enableSharding", &e))?
            .enable_partitioning(database)
            .await;
        absorb("enableSharding", StepKind::EnableDatabasePartitioning, result)
    }

    async fn create_collection(session: &mut AdminSession, namespace: &Namespace) -> StepAttempt {
        let collections = session
            .plane()
            .map_err(|e| StepFailure::from_error("listCollections", &e))?
            .list_collections(namespace.database())
            .await
            .map_err(|e| StepFailure::from_error("listCollections", &e))?;
        if collection_exists(&collections, namespace) {
            return Ok(StepOutcome::AlreadyApplied);
        }

        let result = session
            .plane()
            .map_err(|e| StepFailure::from_error("create", &e))?
            .create_collection(namespace)
            .await;
        absorb("create", StepKind::CreateCollection, result)
    }

    async fn declare_partition_key(
        session: &mut AdminSession,
        namespace: &Namespace,
        key: &KeyPattern,
    ) -> StepAttempt {
        let collections = session
            .plane()
            .map_err(|e| StepFailure::from_error("listCollections", &e))?
            .list_collections(namespace.database())
            .await
            .map_err(|e| StepFailure::from_error("listCollections", &e))?;

        match shard_key_state(existing_shard_key(&collections, namespace), key) {
            ShardKeyState::Matches => return Ok(StepOutcome::AlreadyApplied),
            ShardKeyState::Conflicts(existing) => {
                return Err(StepFailure {
                    reason: format!(
                        "{namespace} is already sharded on {existing}, refusing to change it to {key}"
                    ),
                    kind: ErrorKind::ConfigurationConflict,
                });
            }
            ShardKeyState::Absent => {}
        }

        let result = session
            .plane()
            .map_err(|e| StepFailure::from_error("shardCollection", &e))?
            .shard_collection(namespace, key)
            .await;
        absorb("shardCollection", StepKind::DeclarePartitionKey, result)
    }

    async fn create_index(
        session: &mut AdminSession,
        namespace: &Namespace,
        index: &IndexSpec,
    ) -> StepAttempt {
        let indexes = session
            .plane()
            .map_err(|e| StepFailure::from_error("listIndexes", &e))?
            .list_indexes(namespace)
            .await
            .map_err(|e| StepFailure::from_error("listIndexes", &e))?;

        if let Some(existing) = find_matching_index(&indexes, index) {
            if existing.unique != index.unique {
                warn!(
                    namespace = %namespace,
                    existing = %existing.name,
                    existing_unique = existing.unique,
                    declared_unique = index.unique,
                    "index over the same fields exists with different uniqueness, leaving it as is"
                );
            }
            return Ok(StepOutcome::AlreadyApplied);
        }

        let result = session
            .plane()
            .map_err(|e| StepFailure::from_error("createIndexes", &e))?
            .create_index(namespace, index)
            .await;
        absorb("createIndexes", StepKind::CreateIndex, result)
    }
}

/// Maps a mutation result to an outcome, absorbing "already done" failures.
///
/// A duplicate key reply only means "already done" for shard registration.
fn absorb(command: &str, kind: StepKind, result: crate::core::Result<()>) -> StepAttempt {
    let err = match result {
        Ok(()) => return Ok(StepOutcome::Applied),
        Err(err) => err,
    };
    let error_kind = match kind {
        StepKind::AddShardMember => classify_registration_error(&err),
        _ => classify_error(&err),
    };
    match error_kind {
        ErrorKind::AlreadyConfigured => {
            debug!(command, error = %err, "mutation reported the effect already exists");
            Ok(StepOutcome::AlreadyApplied)
        }
        other => Err(StepFailure::classified(command, &err, other)),
    }
}
