use crate::core::ErrorKind;
use crate::plan::Step;
use crate::topology::Topology;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    AlreadyApplied,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Applied => "[applied]",
            Self::AlreadyApplied => "[already applied]",
            Self::Failed(_) => "[failed]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: Step,
    pub outcome: StepOutcome,
    /// Category of the failure, when the step failed.
    pub error_kind: Option<ErrorKind>,
}

impl StepResult {
    /// One operator-facing line, e.g. `[applied]         add shard rs/h:1`.
    pub fn line(&self) -> String {
        let mut line = format!("{:<18}{}", self.outcome.label(), self.step);
        if let StepOutcome::Failed(reason) = &self.outcome {
            let _ = write!(line, ": {reason}");
            if let Some(kind) = self.error_kind {
                let _ = write!(line, " [{kind}]");
            }
        }
        line
    }
}

/// Outcome of one bootstrap run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<StepResult>,
    /// Steps never attempted because a fatal failure stopped the run.
    pub skipped: usize,
    pub aborted: bool,
}

impl RunReport {
    pub fn applied(&self) -> usize {
        self.count(|o| *o == StepOutcome::Applied)
    }

    pub fn already_applied(&self) -> usize {
        self.count(|o| *o == StepOutcome::AlreadyApplied)
    }

    pub fn failed(&self) -> usize {
        self.count(StepOutcome::is_failed)
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// True when every step found its effect already in place.
    pub fn is_noop(&self) -> bool {
        !self.aborted && self.results.iter().all(|r| r.outcome == StepOutcome::AlreadyApplied)
    }

    /// Process exit code: 0 unless a fatal step stopped the run.
    pub fn exit_code(&self) -> i32 {
        if self.aborted { 1 } else { 0 }
    }

    pub fn headline(&self) -> String {
        let status = if self.aborted {
            "aborted"
        } else if self.failed() > 0 {
            "completed with non-fatal failures"
        } else {
            "completed"
        };
        format!(
            "Run {} {status} in {} ms: {} steps, {} applied, {} already applied, {} failed, {} skipped",
            self.run_id,
            (self.finished_at - self.started_at).num_milliseconds(),
            self.results.len() + self.skipped,
            self.applied(),
            self.already_applied(),
            self.failed(),
            self.skipped,
        )
    }
}

/// Declarative summary of the topology the run was meant to produce.
///
/// Rendered from the declaration, not from queried cluster state.
pub fn render_topology_summary(topology: &Topology) -> String {
    let mut out = String::from("Intended topology:\n  shards:\n");
    for shard in &topology.shards {
        let _ = writeln!(out, "    - {shard}");
    }
    for database in &topology.databases {
        let mode = if database.partitioned {
            "partitioned"
        } else {
            "unpartitioned"
        };
        let _ = writeln!(out, "  database {} ({mode})", database.name);
        for collection in &database.collections {
            let _ = write!(out, "    {}.{}", database.name, collection.name);
            match &collection.shard_key {
                Some(key) => {
                    let _ = writeln!(out, "  shard key {key}");
                }
                None => out.push('\n'),
            }
            for index in &collection.indexes {
                let unique = if index.unique { " unique" } else { "" };
                let _ = writeln!(
                    out,
                    "      index {} {}{unique}",
                    index.resolved_name(),
                    index.keys
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BootstrapError, ShardSpec};

    fn result(outcome: StepOutcome) -> StepResult {
        StepResult {
            step: Step::add_shard(ShardSpec::parse("rs/h:1").unwrap()),
            outcome,
            error_kind: None,
        }
    }

    fn report(results: Vec<StepResult>, aborted: bool) -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            results,
            skipped: if aborted { 2 } else { 0 },
            aborted,
        }
    }

    #[test]
    fn step_lines_label_outcomes() {
        assert_eq!(
            result(StepOutcome::Applied).line(),
            "[applied]         add shard rs/h:1"
        );

        let mut failed = result(StepOutcome::Failed(
            BootstrapError::Unavailable("refused".into()).to_string(),
        ));
        failed.error_kind = Some(ErrorKind::TransientUnavailable);
        assert_eq!(
            failed.line(),
            "[failed]          add shard rs/h:1: Endpoint unavailable: refused [transient unavailable]"
        );
    }

    #[test]
    fn counts_and_exit_codes() {
        let ok = report(
            vec![
                result(StepOutcome::Applied),
                result(StepOutcome::AlreadyApplied),
                result(StepOutcome::Failed("index build failed".into())),
            ],
            false,
        );
        assert_eq!(ok.applied(), 1);
        assert_eq!(ok.already_applied(), 1);
        assert_eq!(ok.failed(), 1);
        assert_eq!(ok.exit_code(), 0);
        assert!(!ok.is_noop());
        assert!(ok.headline().contains("completed with non-fatal failures"));

        let aborted = report(vec![result(StepOutcome::Failed("boom".into()))], true);
        assert_eq!(aborted.exit_code(), 1);
        assert!(aborted.headline().contains("3 steps"));
        assert!(aborted.headline().contains("2 skipped"));

        let noop = report(vec![result(StepOutcome::AlreadyApplied)], false);
        assert!(noop.is_noop());
    }

    #[test]
    fn summary_lists_declared_topology() {
        let summary = render_topology_summary(&Topology::banking().unwrap());
        assert!(summary.contains("    - shard1ReplSet/shard1:27018"));
        assert!(summary.contains("  database banking (partitioned)"));
        assert!(summary.contains("    banking.accounts  shard key { accountNumber: \"hashed\" }"));
        assert!(summary.contains("      index email_1 { email: 1 } unique"));
    }
}
