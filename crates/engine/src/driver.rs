//! Bounded-retry submission of a single deal offer.
//!
//! The driver calls the proposer until it gets a deal identifier, a
//! non-retryable error, or runs out of attempts. Every call result goes
//! through [`classify_attempt`] first, so the retry policy lives in one
//! place.

use crate::error::{ProposalError, ProposalResult, DUPLICATE_TRACKING_MARKER};
use crate::metrics::EngineMetrics;
use crate::proposer::{Proposal, ProposerTrait};
use crate::sizing::PieceSize;
use autodeal_types::{DealConfig, DealOffer, DealRecord, SubmissionState, Task, TokenAmount};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proposal attempts per offer before giving up.
pub const MAX_PROPOSAL_ATTEMPTS: u32 = 60;

/// What a single proposal call means for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Node is still tracking an earlier proposal; try again.
    Transient,
    /// Non-retryable error; give up on this offer.
    Terminal(String),
    /// Proposal taken but no identifier yet; try again.
    Pending,
    /// Node accepted the deal.
    Success { deal_cid: String, start_epoch: i64 },
}

/// Classify one proposal result.
///
/// Duplicate tracking is recognised by the typed variant and, for every
/// other error, by the marker text appearing in its message.
pub fn classify_attempt(result: ProposalResult<Option<Proposal>>) -> AttemptOutcome {
    match result {
        Ok(Some(proposal)) => AttemptOutcome::Success {
            deal_cid: proposal.deal_cid,
            start_epoch: proposal.start_epoch,
        },
        Ok(None) => AttemptOutcome::Pending,
        Err(ProposalError::DuplicateTracking(_)) => AttemptOutcome::Transient,
        Err(e) => {
            let message = e.to_string();
            if message.contains(DUPLICATE_TRACKING_MARKER) {
                AttemptOutcome::Transient
            } else {
                AttemptOutcome::Terminal(message)
            }
        }
    }
}

/// Configuration for the submission driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Attempts per offer.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_PROPOSAL_ATTEMPTS,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Drives the proposal of one offer to a terminal state.
#[derive(Clone, Default)]
pub struct SubmissionDriver {
    config: DriverConfig,
    metrics: Option<EngineMetrics>,
}

impl SubmissionDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Count attempts and outcomes in the given metrics.
    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Submit one offer and return its record in a terminal state.
    ///
    /// The record is `Succeeded` with a deal identifier, `Skipped` after a
    /// terminal error, or `Exhausted` once every attempt was used.
    pub async fn submit<P>(
        &self,
        proposer: &mut P,
        task: &Task,
        config: &DealConfig,
        offer: &DealOffer,
        piece: PieceSize,
        cost: TokenAmount,
    ) -> DealRecord
    where
        P: ProposerTrait + ?Sized,
    {
        let mut record = DealRecord::for_offer(task, config, offer, piece.padded(), cost);
        record.state = SubmissionState::Attempting;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            record.attempts = attempt + 1;
            if let Some(metrics) = &self.metrics {
                metrics.proposal_attempts_total.inc();
            }

            let result = proposer
                .propose_deal(offer, cost, piece, config, attempt)
                .await;

            match classify_attempt(result) {
                AttemptOutcome::Success {
                    deal_cid,
                    start_epoch,
                } => {
                    info!(
                        task_id = %task.uuid,
                        offer_id = offer.id,
                        deal_cid = %deal_cid,
                        start_epoch = start_epoch,
                        attempts = record.attempts,
                        "Deal proposal accepted"
                    );
                    record.deal_cid = Some(deal_cid);
                    record.start_epoch = start_epoch;
                    record.state = SubmissionState::Succeeded;
                    break;
                }
                AttemptOutcome::Terminal(reason) => {
                    warn!(
                        task_id = %task.uuid,
                        offer_id = offer.id,
                        attempt = attempt,
                        error = %reason,
                        "Deal proposal failed, skipping offer"
                    );
                    record.state = SubmissionState::Skipped;
                    break;
                }
                AttemptOutcome::Transient => {
                    debug!(
                        offer_id = offer.id,
                        attempt = attempt,
                        "Proposal identifier already tracked, retrying"
                    );
                }
                AttemptOutcome::Pending => {
                    debug!(
                        offer_id = offer.id,
                        attempt = attempt,
                        "No deal identifier yet, retrying"
                    );
                }
            }
        }

        if !record.state.is_terminal() {
            warn!(
                task_id = %task.uuid,
                offer_id = offer.id,
                attempts = record.attempts,
                "Retry budget exhausted"
            );
            record.state = SubmissionState::Exhausted;
        }

        if let Some(metrics) = &self.metrics {
            let outcome = record.state.to_string();
            metrics
                .deals_submitted_total
                .with_label_values(&[outcome.as_str()])
                .inc();
        }

        record
    }
}
