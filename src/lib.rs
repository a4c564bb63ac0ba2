// ============================================================================
// shardctl Library
// ============================================================================

pub mod bootstrapper;
pub mod connection;
pub mod control;
pub mod core;
pub mod plan;
pub mod report;
pub mod topology;

// Re-export main types for convenience
pub use crate::bootstrapper::ClusterBootstrapper;
pub use crate::connection::{AdminSession, config::BootstrapConfig};
pub use crate::control::{ControlOp, ControlPlane, HttpControlPlane, InMemoryControlPlane};
pub use crate::core::{BootstrapError, ErrorKind, Result, classify_error};
pub use crate::plan::{BootstrapPlan, FailureAction, FailurePolicy, Step, StepKind, StepTarget};
pub use crate::report::{RunReport, StepOutcome, StepResult, render_topology_summary};
pub use crate::topology::Topology;

use std::sync::Arc;

/// Opens a session against `plane`, applies the topology once and releases
/// the session.
///
/// # Examples
///
/// ```
/// use shardctl::{BootstrapConfig, InMemoryControlPlane, Topology, bootstrap};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let plane = Arc::new(InMemoryControlPlane::new());
/// let config = BootstrapConfig::default().initial_wait(Duration::ZERO);
/// let topology = Topology::banking()?;
///
/// let first = bootstrap(plane.clone(), &config, &topology).await?;
/// assert_eq!(first.exit_code(), 0);
///
/// let second = bootstrap(plane, &config, &topology).await?;
/// assert!(second.is_noop());
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(
    plane: Arc<dyn ControlPlane>,
    config: &BootstrapConfig,
    topology: &Topology,
) -> Result<RunReport> {
    let plan = topology.to_plan()?;
    let mut session = AdminSession::open(plane, config).await?;
    let report = ClusterBootstrapper::new(topology.failure_policy)
        .run(&mut session, &plan)
        .await;
    session.close();
    Ok(report)
}
