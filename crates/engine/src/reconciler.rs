//! Per-task reconciliation.
//!
//! Walks a task's offers in order, submits each valid one through the
//! [`SubmissionDriver`], writes the task's artifacts and decides which
//! status, if any, goes back to the coordination service.

use crate::coordinator::{CoordinatorTrait, ReportAck};
use crate::driver::SubmissionDriver;
use crate::error::{CoordinatorResult, EngineResult};
use crate::metrics::EngineMetrics;
use crate::proposer::ProposerTrait;
use crate::sizing::{compute_cost, compute_piece_size};
use autodeal_artifacts::{ArtifactWriter, TaskArtifacts};
use autodeal_types::{
    DealConfig, DealDefaults, DealOffer, DealRecord, SubmissionState, Task, TaskStatus,
};
use tokio::sync::watch;
use tracing::{info, warn};

/// Status to report for `success` accepted deals out of `total` offers.
///
/// Nothing is reported when no deal was accepted.
pub fn decide_status(success: usize, total: usize) -> Option<TaskStatus> {
    if success == 0 {
        None
    } else if success < total {
        Some(TaskStatus::ProgressWithFailure)
    } else {
        Some(TaskStatus::DealSent)
    }
}

/// What happened to one offer of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Node accepted the deal.
    Submitted { offer_id: u64, deal_cid: String },
    /// Node returned a non-retryable error.
    Rejected { offer_id: u64 },
    /// Every proposal attempt was used up.
    Exhausted { offer_id: u64 },
    /// Deal configuration failed validation; never proposed.
    InvalidConfig { offer_id: u64, reason: String },
    /// File size could not be turned into a piece; never proposed.
    InvalidSize { offer_id: u64, reason: String },
}

impl OfferOutcome {
    fn from_record(record: &DealRecord) -> Self {
        let offer_id = record.offer_id;
        match (&record.state, &record.deal_cid) {
            (SubmissionState::Succeeded, Some(deal_cid)) => OfferOutcome::Submitted {
                offer_id,
                deal_cid: deal_cid.clone(),
            },
            (SubmissionState::Exhausted, _) => OfferOutcome::Exhausted { offer_id },
            _ => OfferOutcome::Rejected { offer_id },
        }
    }

    pub fn offer_id(&self) -> u64 {
        match self {
            OfferOutcome::Submitted { offer_id, .. }
            | OfferOutcome::Rejected { offer_id }
            | OfferOutcome::Exhausted { offer_id }
            | OfferOutcome::InvalidConfig { offer_id, .. }
            | OfferOutcome::InvalidSize { offer_id, .. } => *offer_id,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, OfferOutcome::Submitted { .. })
    }

    /// Whether the offer reached the submission driver.
    pub fn was_proposed(&self) -> bool {
        !matches!(
            self,
            OfferOutcome::InvalidConfig { .. } | OfferOutcome::InvalidSize { .. }
        )
    }
}

/// Result of reconciling one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: Task,
    /// One record per offer that reached the driver, in offer order.
    pub records: Vec<DealRecord>,
    /// One entry per offer handled, in offer order.
    pub offers: Vec<OfferOutcome>,
    pub artifacts: TaskArtifacts,
    pub status: Option<TaskStatus>,
    /// Set once the coordination service acknowledged the status report.
    pub reported: bool,
    /// Shutdown was requested before every offer was handled. The records
    /// written so far are kept, but no status is decided.
    pub interrupted: bool,
}

impl TaskOutcome {
    pub fn success_count(&self) -> usize {
        self.offers.iter().filter(|o| o.is_submitted()).count()
    }

    pub fn total_offers(&self) -> usize {
        self.offers.len()
    }
}

/// Reconciles tasks one at a time.
#[derive(Clone)]
pub struct TaskReconciler {
    defaults: DealDefaults,
    driver: SubmissionDriver,
    writer: ArtifactWriter,
    metrics: Option<EngineMetrics>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl TaskReconciler {
    pub fn new(defaults: DealDefaults, driver: SubmissionDriver, writer: ArtifactWriter) -> Self {
        Self {
            defaults,
            driver,
            writer,
            metrics: None,
            shutdown: None,
        }
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.driver = self.driver.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Stop between offers once `shutdown` holds `true`.
    ///
    /// The offer in flight always runs to completion.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub fn defaults(&self) -> &DealDefaults {
        &self.defaults
    }

    /// Submit every offer of `task` and write the task's artifacts.
    ///
    /// Offers are handled independently: one that fails validation or
    /// sizing is skipped without a record, and one whose proposal fails
    /// still gets a record. Only artifact failures abort the task.
    ///
    /// On shutdown the remaining offers are left alone and the artifacts
    /// hold the records gathered so far.
    pub async fn reconcile<P>(
        &self,
        proposer: &mut P,
        task: &Task,
        offers: &[DealOffer],
    ) -> EngineResult<TaskOutcome>
    where
        P: ProposerTrait + ?Sized,
    {
        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.task_duration_seconds.start_timer());

        info!(
            task_id = %task.uuid,
            task_name = %task.task_name,
            offers = offers.len(),
            "Reconciling task"
        );

        let mut records = Vec::with_capacity(offers.len());
        let mut outcomes = Vec::with_capacity(offers.len());
        let mut interrupted = false;

        for offer in offers {
            if self.shutdown_requested() {
                warn!(
                    task_id = %task.uuid,
                    handled = outcomes.len(),
                    remaining = offers.len() - outcomes.len(),
                    "Shutdown requested, leaving remaining offers"
                );
                interrupted = true;
                break;
            }

            let config = DealConfig::for_task(&self.defaults, task);
            if let Err(e) = config.validate() {
                warn!(
                    task_id = %task.uuid,
                    offer_id = offer.id,
                    error = %e,
                    "Invalid deal configuration, skipping offer"
                );
                outcomes.push(OfferOutcome::InvalidConfig {
                    offer_id: offer.id,
                    reason: e.to_string(),
                });
                continue;
            }

            let piece = match compute_piece_size(offer.file_size_bytes()) {
                Ok(piece) => piece,
                Err(e) => {
                    warn!(
                        task_id = %task.uuid,
                        offer_id = offer.id,
                        file_size = %offer.file_size,
                        error = %e,
                        "Unusable file size, skipping offer"
                    );
                    outcomes.push(OfferOutcome::InvalidSize {
                        offer_id: offer.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let cost = compute_cost(piece.sector_size(), config.price_per_gib);

            let record = self
                .driver
                .submit(proposer, task, &config, offer, piece, cost)
                .await;
            outcomes.push(OfferOutcome::from_record(&record));
            records.push(record);
        }

        let artifacts = self.writer.write_task(&task.task_name, &records).await?;

        let success = outcomes.iter().filter(|o| o.is_submitted()).count();
        let status = if interrupted {
            None
        } else {
            decide_status(success, outcomes.len())
        };

        info!(
            task_id = %task.uuid,
            sent = success,
            total = outcomes.len(),
            status = ?status,
            "Task reconciled"
        );

        Ok(TaskOutcome {
            task: task.clone(),
            records,
            offers: outcomes,
            artifacts,
            status,
            reported: false,
            interrupted,
        })
    }

    /// Report the decided status with the summary attached.
    ///
    /// Returns `Ok(None)` without calling the service when there is no
    /// status to report. Artifacts are left as written either way.
    pub async fn report<C>(
        &self,
        coordinator: &mut C,
        outcome: &mut TaskOutcome,
    ) -> CoordinatorResult<Option<ReportAck>>
    where
        C: CoordinatorTrait + ?Sized,
    {
        if outcome.interrupted {
            info!(
                task_id = %outcome.task.uuid,
                "Task interrupted, status left unchanged"
            );
            return Ok(None);
        }

        let Some(status) = outcome.status else {
            info!(
                task_id = %outcome.task.uuid,
                "No deals sent, task status left unchanged"
            );
            return Ok(None);
        };

        let ack = coordinator
            .report_task_status(&outcome.task.uuid, status, &outcome.artifacts.summary_path)
            .await?;
        outcome.reported = true;

        if let Some(metrics) = &self.metrics {
            metrics
                .tasks_reported_total
                .with_label_values(&[status.as_str()])
                .inc();
        }

        info!(
            task_id = %outcome.task.uuid,
            status = %status,
            message = %ack.message,
            "Task status reported"
        );
        Ok(Some(ack))
    }
}
