//! Test harness running the real engine against mock collaborators.

use std::path::{Path, PathBuf};
use std::time::Duration;

use autodeal_artifacts::ArtifactWriter;
use autodeal_engine::{
    AutoDealService, BatchSummary, DriverConfig, EngineMetrics, EngineResult, SubmissionDriver,
    TaskOutcome, TaskReconciler,
};
use autodeal_types::{DealDefaults, DealOffer, Task, TaskType, TokenAmount};
use tempfile::TempDir;
use tokio::sync::watch;

use crate::mocks::{MockCoordinator, MockProposer};

/// Metrics collected across harness runs.
#[derive(Debug, Clone, Default)]
pub struct HarnessMetrics {
    /// Batches run
    pub batches: usize,
    /// Single-task runs
    pub single_runs: usize,
    /// Deals accepted across all runs
    pub deals_sent: usize,
}

/// High-level orchestrator for end-to-end scenarios.
///
/// Owns a temporary output directory, the mock coordinator and node, and
/// the deal defaults. Each run builds a fresh [`AutoDealService`] around
/// the mocks and hands them back afterwards, so recorded calls and reports
/// accumulate across runs.
///
/// # Example
///
/// ```rust,ignore
/// let mut harness = TestHarness::new();
/// let uuid = harness.add_task("dataset-a", &["2048", "4096"]);
///
/// let summary = harness.run_batch().await?;
/// harness.assert_reported(&uuid, TaskStatus::DealSent);
/// ```
pub struct TestHarness {
    /// Mock coordination service
    pub coordinator: MockCoordinator,
    /// Mock storage node
    pub proposer: MockProposer,
    /// Deal defaults used for every task
    pub defaults: DealDefaults,
    /// Driver settings
    pub driver: DriverConfig,
    output: TempDir,
    output_subdir: Option<PathBuf>,
    engine_metrics: Option<EngineMetrics>,
    shutdown: Option<watch::Receiver<bool>>,
    next_offer_id: u64,
    metrics: HarnessMetrics,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Create a new test harness.
    ///
    /// # Panics
    /// Panics if a temporary directory cannot be created.
    pub fn new() -> Self {
        let output = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("failed to create harness output dir: {e}"),
        };

        Self {
            coordinator: MockCoordinator::new(),
            proposer: MockProposer::new(),
            defaults: DealDefaults {
                sender_wallet: "f3simulatedwallet".to_string(),
                price_per_gib: TokenAmount::from_atto(1_000_000_000),
                ..DealDefaults::default()
            },
            driver: DriverConfig {
                retry_delay: Duration::ZERO,
                ..DriverConfig::default()
            },
            output,
            output_subdir: None,
            engine_metrics: None,
            shutdown: None,
            next_offer_id: 1,
            metrics: HarnessMetrics::default(),
        }
    }

    /// Replace the mock node.
    pub fn with_proposer(mut self, proposer: MockProposer) -> Self {
        self.proposer = proposer;
        self
    }

    /// Write artifacts to a not-yet-existing directory below the temp dir.
    pub fn with_output_subdir(mut self, name: &str) -> Self {
        self.output_subdir = Some(self.output.path().join(name));
        self
    }

    /// Count engine activity in the given metrics.
    pub fn with_engine_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.engine_metrics = Some(metrics);
        self
    }

    /// Let the engine observe a shutdown signal.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Directory the engine writes artifacts to.
    pub fn output_dir(&self) -> PathBuf {
        self.output_subdir
            .clone()
            .unwrap_or_else(|| self.output.path().to_path_buf())
    }

    /// Add a task with one offer per file size and return its ID.
    pub fn add_task(&mut self, name: &str, file_sizes: &[&str]) -> String {
        let task = Task {
            uuid: format!("uuid-{name}"),
            task_name: name.to_string(),
            miner_fid: Some("f01000".to_string()),
            task_type: Some(TaskType::Regular),
            fast_retrieval: Some(true),
            max_price: None,
            duration: None,
        };
        self.add_custom_task(task, file_sizes)
    }

    /// Add a prepared task with one offer per file size and return its ID.
    pub fn add_custom_task(&mut self, task: Task, file_sizes: &[&str]) -> String {
        let offers = file_sizes.iter().map(|size| self.make_offer(size)).collect();
        let uuid = task.uuid.clone();
        self.coordinator.add_task(task, offers);
        uuid
    }

    /// Offer IDs are unique across the whole harness.
    fn make_offer(&mut self, file_size: &str) -> DealOffer {
        let id = self.next_offer_id;
        self.next_offer_id += 1;
        DealOffer {
            id,
            file_size: file_size.to_string(),
            piece_cid: format!("baga6ea4seaq{id}"),
            payload_cid: format!("bafybeig{id}"),
            file_source_url: format!("https://cars.example/{id}.car"),
            md5_origin: format!("{id:032x}"),
            start_epoch: 0,
        }
    }

    fn build_service(&mut self) -> AutoDealService<MockCoordinator, MockProposer> {
        let mut reconciler = TaskReconciler::new(
            self.defaults.clone(),
            SubmissionDriver::new(self.driver.clone()),
            ArtifactWriter::new(self.output_dir()),
        );
        if let Some(metrics) = &self.engine_metrics {
            reconciler = reconciler.with_metrics(metrics.clone());
        }
        if let Some(shutdown) = &self.shutdown {
            reconciler = reconciler.with_shutdown(shutdown.clone());
        }

        AutoDealService::new(
            std::mem::take(&mut self.coordinator),
            std::mem::take(&mut self.proposer),
            reconciler,
        )
    }

    fn restore(&mut self, service: AutoDealService<MockCoordinator, MockProposer>) {
        let (coordinator, proposer, _) = service.into_parts();
        self.coordinator = coordinator;
        self.proposer = proposer;
    }

    /// Run one batch over every assigned task.
    pub async fn run_batch(&mut self) -> EngineResult<BatchSummary> {
        let mut service = self.build_service();
        let result = service.run_batch().await;
        self.restore(service);

        self.metrics.batches += 1;
        if let Ok(summary) = &result {
            self.metrics.deals_sent += summary.deals_sent();
        }
        result
    }

    /// Run the single-task entry point.
    pub async fn run_single(&mut self, task_uuid: &str) -> EngineResult<TaskOutcome> {
        let mut service = self.build_service();
        let result = service.run_single(task_uuid).await;
        self.restore(service);

        self.metrics.single_runs += 1;
        if let Ok(outcome) = &result {
            self.metrics.deals_sent += outcome.success_count();
        }
        result
    }

    /// Path of an artifact in the output directory.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.output_dir().join(file_name)
    }

    /// Read an artifact from the output directory.
    ///
    /// # Panics
    /// Panics if the file is missing.
    pub fn read_artifact(&self, file_name: &str) -> String {
        let path = self.artifact_path(file_name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => panic!("artifact {} unreadable: {e}", path.display()),
        }
    }

    /// Assert that a task was reported with the given status.
    pub fn assert_reported(&self, task_uuid: &str, status: autodeal_types::TaskStatus) {
        match self.coordinator.report_for(task_uuid) {
            Some(report) => assert_eq!(
                report.status, status,
                "Task {task_uuid} reported with unexpected status"
            ),
            None => panic!("Task {task_uuid} was not reported"),
        }
    }

    /// Assert that a task was never reported.
    pub fn assert_not_reported(&self, task_uuid: &str) {
        assert!(
            self.coordinator.report_for(task_uuid).is_none(),
            "Task {task_uuid} should not have been reported"
        );
    }

    /// Assert that the output directory holds the three task artifacts.
    pub fn assert_artifacts_written(&self, task_name: &str) {
        for name in [
            format!("{task_name}-autodeal-deals.json"),
            format!("{task_name}-autodeal-deals.csv"),
            format!("{task_name}_autodeal.csv"),
        ] {
            assert!(
                self.output_dir().join(&name).exists(),
                "Artifact {name} missing"
            );
        }
    }

    /// Get collected metrics.
    pub fn metrics(&self) -> &HarnessMetrics {
        &self.metrics
    }

    /// Whether a path lies inside the harness output directory.
    pub fn owns_path(&self, path: &Path) -> bool {
        path.starts_with(self.output.path())
    }
}
