//! Task fetch loop.
//!
//! [`AutoDealService`] ties the coordination service, the storage node and
//! the reconciler together. [`AutoDealService::run_batch`] handles every
//! task assigned to this provider and survives per-task failures;
//! [`AutoDealService::run_single`] handles one task and surfaces every
//! failure to the caller.

use crate::coordinator::CoordinatorTrait;
use crate::error::{EngineError, EngineResult};
use crate::proposer::ProposerTrait;
use crate::reconciler::{TaskOutcome, TaskReconciler};
use tracing::{error, info, warn};

/// A task the batch could not finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_uuid: String,
    pub task_name: String,
    pub error: String,
}

/// Result of one pass over the assigned tasks.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Tasks that were reconciled, in processing order.
    pub completed: Vec<TaskOutcome>,
    pub failed: Vec<TaskFailure>,
    /// Shutdown cut the batch short; later tasks were not touched.
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn tasks_seen(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn deals_sent(&self) -> usize {
        self.completed.iter().map(TaskOutcome::success_count).sum()
    }
}

/// Auto-bid deal service for one storage provider.
pub struct AutoDealService<C, P> {
    coordinator: C,
    proposer: P,
    reconciler: TaskReconciler,
}

impl<C, P> AutoDealService<C, P>
where
    C: CoordinatorTrait,
    P: ProposerTrait,
{
    pub fn new(coordinator: C, proposer: P, reconciler: TaskReconciler) -> Self {
        Self {
            coordinator,
            proposer,
            reconciler,
        }
    }

    pub fn coordinator(&self) -> &C {
        &self.coordinator
    }

    pub fn proposer(&self) -> &P {
        &self.proposer
    }

    pub fn reconciler(&self) -> &TaskReconciler {
        &self.reconciler
    }

    /// Take the collaborators back out of the service.
    pub fn into_parts(self) -> (C, P, TaskReconciler) {
        (self.coordinator, self.proposer, self.reconciler)
    }

    /// Process every task currently assigned to this provider.
    ///
    /// An unusable output directory or a failed task listing aborts the
    /// batch. Anything that goes wrong inside a single task is logged,
    /// recorded in the summary, and the next task is processed.
    ///
    /// A shutdown request lets the current offer finish, writes that task's
    /// artifacts and then ends the batch without touching later tasks.
    pub async fn run_batch(&mut self) -> EngineResult<BatchSummary> {
        self.reconciler.writer().ensure_output_dir().await?;

        let tasks = self.coordinator.list_assigned_tasks().await?;
        let mut summary = BatchSummary::default();

        if tasks.is_empty() {
            info!("No tasks assigned");
            return Ok(summary);
        }

        info!(tasks = tasks.len(), "Processing assigned tasks");

        for task in tasks {
            if self.reconciler.shutdown_requested() {
                info!(task_id = %task.uuid, "Shutdown requested, ending batch");
                summary.interrupted = true;
                break;
            }

            match self.process_task(&task.uuid).await {
                Ok(outcome) => {
                    summary.interrupted |= outcome.interrupted;
                    summary.completed.push(outcome);
                }
                Err(e) => {
                    error!(
                        task_id = %task.uuid,
                        task_name = %task.task_name,
                        error = %e,
                        "Task failed"
                    );
                    summary.failed.push(TaskFailure {
                        task_uuid: task.uuid,
                        task_name: task.task_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            deals_sent = summary.deals_sent(),
            interrupted = summary.interrupted,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Fetch, reconcile and report one task within a batch.
    ///
    /// Report failures are logged and leave the outcome unreported.
    async fn process_task(&mut self, task_uuid: &str) -> EngineResult<TaskOutcome> {
        let (task, offers) = self.coordinator.list_offered_deals(task_uuid).await?;
        let mut outcome = self
            .reconciler
            .reconcile(&mut self.proposer, &task, &offers)
            .await?;

        if let Err(e) = self
            .reconciler
            .report(&mut self.coordinator, &mut outcome)
            .await
        {
            warn!(
                task_id = %task.uuid,
                error = %e,
                "Failed to report task status"
            );
        }

        Ok(outcome)
    }

    /// Process one task by identifier.
    ///
    /// Fails with [`EngineError::NoDealsSent`] when none of the task's
    /// offers was accepted; in that case nothing is reported.
    pub async fn run_single(&mut self, task_uuid: &str) -> EngineResult<TaskOutcome> {
        self.reconciler.writer().ensure_output_dir().await?;

        let (task, offers) = self.coordinator.list_offered_deals(task_uuid).await?;
        let mut outcome = self
            .reconciler
            .reconcile(&mut self.proposer, &task, &offers)
            .await?;

        if outcome.success_count() == 0 {
            return Err(EngineError::NoDealsSent {
                task_uuid: task.uuid,
                task_name: task.task_name,
            });
        }

        self.reconciler
            .report(&mut self.coordinator, &mut outcome)
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ReportAck;
    use crate::driver::{DriverConfig, SubmissionDriver};
    use crate::error::{CoordinatorError, CoordinatorResult, ProposalError, ProposalResult};
    use crate::proposer::Proposal;
    use crate::sizing::PieceSize;
    use async_trait::async_trait;
    use autodeal_artifacts::ArtifactWriter;
    use autodeal_types::{DealConfig, DealDefaults, DealOffer, Task, TaskStatus, TokenAmount};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeCoordinator {
        tasks: Vec<Task>,
        offers: HashMap<String, Vec<DealOffer>>,
        reports: Vec<(String, TaskStatus)>,
        fail_reports: bool,
    }

    impl FakeCoordinator {
        fn new(tasks: &[&str]) -> Self {
            let tasks: Vec<Task> = tasks.iter().map(|uuid| task(uuid)).collect();
            let offers = tasks
                .iter()
                .map(|t| (t.uuid.clone(), vec![offer(1), offer(2)]))
                .collect();
            Self {
                tasks,
                offers,
                reports: Vec::new(),
                fail_reports: false,
            }
        }
    }

    #[async_trait]
    impl CoordinatorTrait for FakeCoordinator {
        async fn list_assigned_tasks(&mut self) -> CoordinatorResult<Vec<Task>> {
            Ok(self.tasks.clone())
        }

        async fn list_offered_deals(
            &mut self,
            task_uuid: &str,
        ) -> CoordinatorResult<(Task, Vec<DealOffer>)> {
            let offers = self
                .offers
                .get(task_uuid)
                .cloned()
                .ok_or_else(|| CoordinatorError::Rejected("deals unavailable".to_string()))?;
            Ok((task(task_uuid), offers))
        }

        async fn report_task_status(
            &mut self,
            task_uuid: &str,
            status: TaskStatus,
            _summary_path: &Path,
        ) -> CoordinatorResult<ReportAck> {
            if self.fail_reports {
                return Err(CoordinatorError::Rejected("report refused".to_string()));
            }
            self.reports.push((task_uuid.to_string(), status));
            Ok(ReportAck {
                message: "ok".to_string(),
            })
        }
    }

    struct FakeProposer {
        accept: bool,
    }

    #[async_trait]
    impl ProposerTrait for FakeProposer {
        async fn propose_deal(
            &mut self,
            offer: &DealOffer,
            _cost: TokenAmount,
            _piece: PieceSize,
            _config: &DealConfig,
            _attempt: u32,
        ) -> ProposalResult<Option<Proposal>> {
            if self.accept {
                Ok(Some(Proposal {
                    deal_cid: format!("bafydeal{}", offer.id),
                    start_epoch: 9000,
                }))
            } else {
                Err(ProposalError::Rejected("not accepting deals".to_string()))
            }
        }
    }

    fn task(uuid: &str) -> Task {
        Task {
            uuid: uuid.to_string(),
            task_name: format!("dataset-{uuid}"),
            miner_fid: Some("f01234".to_string()),
            task_type: None,
            fast_retrieval: None,
            max_price: None,
            duration: None,
        }
    }

    fn offer(id: u64) -> DealOffer {
        DealOffer {
            id,
            file_size: "2048".to_string(),
            piece_cid: "baga".to_string(),
            payload_cid: "bafy".to_string(),
            file_source_url: format!("https://example.org/{id}.car"),
            md5_origin: "abc".to_string(),
            start_epoch: 4000,
        }
    }

    fn service(
        dir: &Path,
        coordinator: FakeCoordinator,
        accept: bool,
    ) -> AutoDealService<FakeCoordinator, FakeProposer> {
        let defaults = DealDefaults {
            sender_wallet: "f3wallet".to_string(),
            price_per_gib: TokenAmount::from_atto(1),
            ..DealDefaults::default()
        };
        let driver = SubmissionDriver::new(DriverConfig {
            max_attempts: 3,
            retry_delay: Duration::ZERO,
        });
        let reconciler = TaskReconciler::new(defaults, driver, ArtifactWriter::new(dir));
        AutoDealService::new(coordinator, FakeProposer { accept }, reconciler)
    }

    #[tokio::test]
    async fn test_batch_continues_past_failed_task() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = FakeCoordinator::new(&["a", "b", "c"]);
        coordinator.offers.remove("b");
        let mut service = service(temp_dir.path(), coordinator, true);

        let summary = service.run_batch().await.unwrap();

        assert_eq!(summary.tasks_seen(), 3);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].task_uuid, "b");

        let done: Vec<&str> = summary
            .completed
            .iter()
            .map(|o| o.task.uuid.as_str())
            .collect();
        assert_eq!(done, vec!["a", "c"]);
        assert_eq!(summary.deals_sent(), 4);
        assert_eq!(
            service.coordinator().reports,
            vec![
                ("a".to_string(), TaskStatus::DealSent),
                ("c".to_string(), TaskStatus::DealSent),
            ]
        );
    }

    #[tokio::test]
    async fn test_batch_without_tasks_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        let mut service = service(&out, FakeCoordinator::new(&[]), true);

        let summary = service.run_batch().await.unwrap();

        assert_eq!(summary.tasks_seen(), 0);
        assert!(out.is_dir());
    }

    #[tokio::test]
    async fn test_batch_report_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut coordinator = FakeCoordinator::new(&["a"]);
        coordinator.fail_reports = true;
        let mut service = service(temp_dir.path(), coordinator, true);

        let summary = service.run_batch().await.unwrap();

        assert_eq!(summary.completed.len(), 1);
        assert!(!summary.completed[0].reported);
        assert!(summary.completed[0].artifacts.summary_path.exists());
    }

    #[tokio::test]
    async fn test_single_task_without_deals_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = service(temp_dir.path(), FakeCoordinator::new(&["a"]), false);

        let err = service.run_single("a").await.unwrap_err();

        assert!(matches!(err, EngineError::NoDealsSent { ref task_uuid, .. } if task_uuid == "a"));
        assert!(service.coordinator().reports.is_empty());
    }

    #[tokio::test]
    async fn test_single_task_fetch_error_is_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = service(temp_dir.path(), FakeCoordinator::new(&["a"]), true);

        let err = service.run_single("missing").await.unwrap_err();

        assert!(matches!(err, EngineError::Coordinator(_)));
    }

    #[tokio::test]
    async fn test_single_task_reports_status() {
        let temp_dir = TempDir::new().unwrap();
        let mut service = service(temp_dir.path(), FakeCoordinator::new(&["a"]), true);

        let outcome = service.run_single("a").await.unwrap();

        assert!(outcome.reported);
        assert_eq!(outcome.status, Some(TaskStatus::DealSent));
        assert_eq!(service.coordinator().reports.len(), 1);
    }
}
