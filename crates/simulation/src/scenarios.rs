//! Pre-defined test scenarios for common simulation patterns.
//!
//! Each scenario encapsulates setup, execution, and verification logic
//! for a specific test case.

use autodeal_engine::{EngineError, MAX_PROPOSAL_ATTEMPTS};
use autodeal_types::TaskStatus;
use thiserror::Error;

use crate::harness::TestHarness;
use crate::mocks::{MockProposer, NodeResponse};

/// Errors from scenario verification.
#[derive(Debug, Error)]
pub enum ScenarioFailure {
    /// Unexpected number of accepted deals
    #[error("Unexpected deal count: expected {expected}, got {actual}")]
    DealCount { expected: usize, actual: usize },
    /// Unexpected reports
    #[error("Unexpected reports: {0}")]
    Reports(String),
    /// Unexpected proposal call count
    #[error("Unexpected proposal calls: expected {expected}, got {actual}")]
    ProposalCalls { expected: usize, actual: usize },
    /// Engine run failed or did not fail as expected
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for scenario verification.
pub type ScenarioVerifyResult = Result<(), ScenarioFailure>;

/// Result of running a scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioResult {
    /// Tasks the batch reconciled
    pub tasks_completed: usize,
    /// Tasks the batch gave up on
    pub tasks_failed: Vec<String>,
    /// Accepted deals
    pub deals_sent: usize,
    /// Reports received by the coordinator, in order
    pub reports: Vec<(String, TaskStatus)>,
    /// Proposal calls received by the node
    pub proposal_calls: usize,
    /// Error returned by the engine, if any
    pub error: Option<String>,
    /// Whether the error was a zero-deal single-task run
    pub no_deals_sent: bool,
}

/// Pre-defined test scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// 2 tasks, every offer accepted first time
    AllAccepted,
    /// 1 task of 3 offers, the node rejects one
    PartialFailure,
    /// 1 offer the node keeps reporting as already tracked
    DuplicateStorm,
    /// 3 tasks, fetching the middle one fails
    FailingTask,
    /// Single-task run where the node rejects everything
    SingleTaskNoDeals,
}

impl Scenario {
    /// All scenarios.
    pub const ALL: [Scenario; 5] = [
        Scenario::AllAccepted,
        Scenario::PartialFailure,
        Scenario::DuplicateStorm,
        Scenario::FailingTask,
        Scenario::SingleTaskNoDeals,
    ];

    /// Run the scenario.
    pub async fn run(&self, harness: &mut TestHarness) -> ScenarioResult {
        match self {
            Scenario::AllAccepted => {
                harness.add_task("alpha", &["2048", "1048576"]);
                harness.add_task("beta", &["999"]);
                run_batch(harness).await
            }
            Scenario::PartialFailure => {
                harness.add_task("gamma", &["100", "200", "300"]);
                let rejected = harness.proposer.clone().with_script(
                    2,
                    vec![NodeResponse::Reject("piece CID mismatch".to_string())],
                );
                harness.proposer = rejected;
                run_batch(harness).await
            }
            Scenario::DuplicateStorm => {
                harness.add_task("delta", &["4096"]);
                harness.proposer = MockProposer::new().with_default(NodeResponse::Duplicate);
                run_batch(harness).await
            }
            Scenario::FailingTask => {
                harness.add_task("a", &["10"]);
                let failing = harness.add_task("b", &["20"]);
                harness.add_task("c", &["30"]);
                harness.coordinator = std::mem::take(&mut harness.coordinator)
                    .with_failing_fetch(&failing);
                run_batch(harness).await
            }
            Scenario::SingleTaskNoDeals => {
                let uuid = harness.add_task("epsilon", &["2048", "2048"]);
                harness.proposer = MockProposer::new()
                    .with_default(NodeResponse::Reject("wallet has no funds".to_string()));
                run_single(harness, &uuid).await
            }
        }
    }

    /// Verify the scenario result.
    pub fn verify(&self, result: &ScenarioResult) -> ScenarioVerifyResult {
        match self {
            Scenario::AllAccepted => {
                expect_deals(result, 3)?;
                expect_reports(
                    result,
                    &[
                        ("uuid-alpha", TaskStatus::DealSent),
                        ("uuid-beta", TaskStatus::DealSent),
                    ],
                )?;
                expect_calls(result, 3)
            }
            Scenario::PartialFailure => {
                expect_deals(result, 2)?;
                expect_reports(result, &[("uuid-gamma", TaskStatus::ProgressWithFailure)])?;
                expect_calls(result, 3)
            }
            Scenario::DuplicateStorm => {
                expect_deals(result, 0)?;
                expect_reports(result, &[])?;
                expect_calls(result, MAX_PROPOSAL_ATTEMPTS as usize)
            }
            Scenario::FailingTask => {
                if result.tasks_failed != ["uuid-b"] {
                    return Err(ScenarioFailure::InvalidState(format!(
                        "expected only uuid-b to fail, got {:?}",
                        result.tasks_failed
                    )));
                }
                expect_deals(result, 2)?;
                expect_reports(
                    result,
                    &[
                        ("uuid-a", TaskStatus::DealSent),
                        ("uuid-c", TaskStatus::DealSent),
                    ],
                )
            }
            Scenario::SingleTaskNoDeals => {
                if !result.no_deals_sent {
                    return Err(ScenarioFailure::InvalidState(format!(
                        "expected a zero-deal error, got {:?}",
                        result.error
                    )));
                }
                expect_reports(result, &[])?;
                expect_calls(result, 2)
            }
        }
    }
}

async fn run_batch(harness: &mut TestHarness) -> ScenarioResult {
    let mut result = ScenarioResult::default();
    match harness.run_batch().await {
        Ok(summary) => {
            result.tasks_completed = summary.completed.len();
            result.tasks_failed = summary.failed.into_iter().map(|f| f.task_uuid).collect();
            result.deals_sent = summary
                .completed
                .iter()
                .map(|outcome| outcome.success_count())
                .sum();
        }
        Err(e) => result.error = Some(e.to_string()),
    }
    collect_mock_state(harness, &mut result);
    result
}

async fn run_single(harness: &mut TestHarness, task_uuid: &str) -> ScenarioResult {
    let mut result = ScenarioResult::default();
    match harness.run_single(task_uuid).await {
        Ok(outcome) => {
            result.tasks_completed = 1;
            result.deals_sent = outcome.success_count();
        }
        Err(e) => {
            result.no_deals_sent = matches!(e, EngineError::NoDealsSent { .. });
            result.error = Some(e.to_string());
        }
    }
    collect_mock_state(harness, &mut result);
    result
}

fn collect_mock_state(harness: &TestHarness, result: &mut ScenarioResult) {
    result.reports = harness
        .coordinator
        .reports
        .iter()
        .map(|r| (r.task_uuid.clone(), r.status))
        .collect();
    result.proposal_calls = harness.proposer.call_count();
}

fn expect_deals(result: &ScenarioResult, expected: usize) -> ScenarioVerifyResult {
    if result.deals_sent != expected {
        return Err(ScenarioFailure::DealCount {
            expected,
            actual: result.deals_sent,
        });
    }
    Ok(())
}

fn expect_calls(result: &ScenarioResult, expected: usize) -> ScenarioVerifyResult {
    if result.proposal_calls != expected {
        return Err(ScenarioFailure::ProposalCalls {
            expected,
            actual: result.proposal_calls,
        });
    }
    Ok(())
}

fn expect_reports(result: &ScenarioResult, expected: &[(&str, TaskStatus)]) -> ScenarioVerifyResult {
    let matches = result.reports.len() == expected.len()
        && result
            .reports
            .iter()
            .zip(expected)
            .all(|((uuid, status), (want_uuid, want_status))| {
                uuid == want_uuid && status == want_status
            });

    if !matches {
        return Err(ScenarioFailure::Reports(format!(
            "expected {expected:?}, got {:?}",
            result.reports
        )));
    }
    Ok(())
}
