//! Mock coordination service for testing the task fetch loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autodeal_engine::{CoordinatorError, CoordinatorResult, CoordinatorTrait, ReportAck};
use autodeal_types::{DealOffer, Task, TaskStatus};

/// A recorded status report for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Task ID.
    pub task_uuid: String,
    /// Reported status.
    pub status: TaskStatus,
    /// Path of the uploaded summary.
    pub summary_path: PathBuf,
    /// Summary contents at upload time.
    pub summary: String,
}

/// Mock coordination service.
///
/// Holds a fixed set of tasks with their offers. Individual tasks can be
/// made to fail on fetch, and reports can be made to fail as a whole.
#[derive(Debug, Clone, Default)]
pub struct MockCoordinator {
    /// Received status reports, in order.
    pub reports: VecDeque<StatusReport>,
    tasks: Vec<Task>,
    offers: HashMap<String, Vec<DealOffer>>,
    failing_fetch: HashSet<String>,
    fail_listing: bool,
    fail_reports: bool,
}

impl MockCoordinator {
    /// Create an empty mock coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a task with its offers.
    pub fn with_task(mut self, task: Task, offers: Vec<DealOffer>) -> Self {
        self.add_task(task, offers);
        self
    }

    /// Make fetching one task's offers fail.
    pub fn with_failing_fetch(mut self, task_uuid: &str) -> Self {
        self.failing_fetch.insert(task_uuid.to_string());
        self
    }

    /// Make the task listing fail.
    pub fn with_fail_listing(mut self, fail: bool) -> Self {
        self.fail_listing = fail;
        self
    }

    /// Make every status report fail.
    pub fn with_fail_reports(mut self, fail: bool) -> Self {
        self.fail_reports = fail;
        self
    }

    /// Assign a task with its offers.
    pub fn add_task(&mut self, task: Task, offers: Vec<DealOffer>) {
        self.offers.insert(task.uuid.clone(), offers);
        self.tasks.push(task);
    }

    /// Get the number of status reports.
    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    /// Get the report for a specific task.
    pub fn report_for(&self, task_uuid: &str) -> Option<&StatusReport> {
        self.reports.iter().find(|r| r.task_uuid == task_uuid)
    }
}

#[async_trait]
impl CoordinatorTrait for MockCoordinator {
    async fn list_assigned_tasks(&mut self) -> CoordinatorResult<Vec<Task>> {
        if self.fail_listing {
            return Err(CoordinatorError::Rejected(
                "Mock listing failure enabled".to_string(),
            ));
        }
        Ok(self.tasks.clone())
    }

    async fn list_offered_deals(
        &mut self,
        task_uuid: &str,
    ) -> CoordinatorResult<(Task, Vec<DealOffer>)> {
        if self.failing_fetch.contains(task_uuid) {
            return Err(CoordinatorError::Rejected(format!(
                "Mock fetch failure for {task_uuid}"
            )));
        }

        let task = self
            .tasks
            .iter()
            .find(|t| t.uuid == task_uuid)
            .cloned()
            .ok_or_else(|| CoordinatorError::TaskNotFound {
                task_uuid: task_uuid.to_string(),
            })?;
        let offers = self.offers.get(task_uuid).cloned().unwrap_or_default();
        Ok((task, offers))
    }

    async fn report_task_status(
        &mut self,
        task_uuid: &str,
        status: TaskStatus,
        summary_path: &Path,
    ) -> CoordinatorResult<ReportAck> {
        if self.fail_reports {
            return Err(CoordinatorError::Rejected(
                "Mock report failure enabled".to_string(),
            ));
        }

        let summary = tokio::fs::read_to_string(summary_path).await?;
        self.reports.push_back(StatusReport {
            task_uuid: task_uuid.to_string(),
            status,
            summary_path: summary_path.to_path_buf(),
            summary,
        });

        Ok(ReportAck {
            message: format!("task {task_uuid} updated to {status}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(uuid: &str) -> Task {
        Task {
            uuid: uuid.to_string(),
            task_name: uuid.to_string(),
            miner_fid: Some("f01".to_string()),
            task_type: None,
            fast_retrieval: None,
            max_price: None,
            duration: None,
        }
    }

    #[tokio::test]
    async fn test_listing_and_fetch() {
        let mut coordinator = MockCoordinator::new()
            .with_task(task("a"), vec![])
            .with_task(task("b"), vec![])
            .with_failing_fetch("b");

        assert_eq!(coordinator.list_assigned_tasks().await.unwrap().len(), 2);
        assert!(coordinator.list_offered_deals("a").await.is_ok());
        assert!(matches!(
            coordinator.list_offered_deals("b").await,
            Err(CoordinatorError::Rejected(_))
        ));
        assert!(matches!(
            coordinator.list_offered_deals("c").await,
            Err(CoordinatorError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_report_reads_summary() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a_autodeal.csv");
        std::fs::write(&path, "uuid\na\n").unwrap();

        let mut coordinator = MockCoordinator::new();
        let ack = coordinator
            .report_task_status("a", TaskStatus::DealSent, &path)
            .await
            .unwrap();

        assert_eq!(ack.message, "task a updated to DealSent");
        assert_eq!(coordinator.report_for("a").unwrap().summary, "uuid\na\n");
    }

    #[tokio::test]
    async fn test_fail_modes() {
        let mut coordinator = MockCoordinator::new()
            .with_fail_listing(true)
            .with_fail_reports(true);

        assert!(coordinator.list_assigned_tasks().await.is_err());
        assert!(coordinator
            .report_task_status("a", TaskStatus::DealSent, Path::new("/nonexistent"))
            .await
            .is_err());
        assert_eq!(coordinator.report_count(), 0);
    }
}
