//! Core types for the autodeal service
//!
//! This crate provides the data model shared by the submission engine, the
//! artifact writers and the binary: tasks and deal offers as fetched from the
//! coordination service, the per-task deal configuration, and the deal
//! records that make up the audit trail.

mod amount;
mod config;

use serde::{Deserialize, Serialize};

pub use amount::{AmountParseError, TokenAmount, ATTO_PER_TOKEN, TOKEN_DECIMALS};
pub use config::{
    ConfigError, DealConfig, DealDefaults, EPOCHS_PER_HOUR, MAX_DURATION_EPOCHS,
    MIN_DURATION_EPOCHS,
};

/// Deal type requested by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Deal paid with verified-client datacap
    Verified,
    /// Ordinary paid deal
    Regular,
}

/// A unit of work assigned to this provider by the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: String,
    pub task_name: String,
    /// Storage provider the task's deals go to.
    #[serde(default)]
    pub miner_fid: Option<String>,
    #[serde(default, rename = "type")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub fast_retrieval: Option<bool>,
    /// Highest price per GiB the task owner accepts.
    #[serde(default)]
    pub max_price: Option<TokenAmount>,
    /// Deal duration in epochs, if the task overrides the default.
    #[serde(default)]
    pub duration: Option<i64>,
}

/// One candidate deal within a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealOffer {
    pub id: u64,
    /// Raw payload size in bytes, as sent by the coordination service.
    pub file_size: String,
    pub piece_cid: String,
    pub payload_cid: String,
    pub file_source_url: String,
    pub md5_origin: String,
    pub start_epoch: i64,
}

impl DealOffer {
    /// Payload size in bytes. Unparsable sizes read as zero so the offer is
    /// rejected by sizing rather than proposed with a bogus size.
    pub fn file_size_bytes(&self) -> i64 {
        self.file_size.trim().parse().unwrap_or(0)
    }
}

/// Status reported back to the coordination service for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Every offer of the task was submitted
    DealSent,
    /// Some offers were submitted, some were not
    ProgressWithFailure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::DealSent => "DealSent",
            TaskStatus::ProgressWithFailure => "ProgressWithFailure",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission state of a single offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    /// Not yet attempted
    Pending,
    /// Proposal attempts in progress
    Attempting,
    /// Node accepted the proposal and returned a deal identifier
    Succeeded,
    /// Node rejected the proposal with a non-retryable error
    Skipped,
    /// Retry budget ran out without acceptance
    Exhausted,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded | SubmissionState::Skipped | SubmissionState::Exhausted
        )
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionState::Pending => write!(f, "Pending"),
            SubmissionState::Attempting => write!(f, "Attempting"),
            SubmissionState::Succeeded => write!(f, "Succeeded"),
            SubmissionState::Skipped => write!(f, "Skipped"),
            SubmissionState::Exhausted => write!(f, "Exhausted"),
        }
    }
}

/// Audit-trail row for one offer that reached the proposal stage.
///
/// `deal_cid` is only set once the node accepts the proposal; `start_epoch`
/// holds the requested epoch until then and the accepted one afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub task_uuid: String,
    pub miner_fid: String,
    pub offer_id: u64,
    pub car_file_url: String,
    pub car_file_md5: String,
    pub start_epoch: i64,
    pub piece_cid: String,
    pub payload_cid: String,
    pub file_size: i64,
    pub piece_size: u64,
    pub cost: TokenAmount,
    pub deal_cid: Option<String>,
    pub state: SubmissionState,
    pub attempts: u32,
}

impl DealRecord {
    /// Fresh record for an offer about to be proposed.
    pub fn for_offer(
        task: &Task,
        config: &DealConfig,
        offer: &DealOffer,
        piece_size: u64,
        cost: TokenAmount,
    ) -> Self {
        Self {
            task_uuid: task.uuid.clone(),
            miner_fid: config.miner_fid.clone(),
            offer_id: offer.id,
            car_file_url: offer.file_source_url.clone(),
            car_file_md5: offer.md5_origin.clone(),
            start_epoch: offer.start_epoch,
            piece_cid: offer.piece_cid.clone(),
            payload_cid: offer.payload_cid.clone(),
            file_size: offer.file_size_bytes(),
            piece_size,
            cost,
            deal_cid: None,
            state: SubmissionState::Pending,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == SubmissionState::Succeeded && self.deal_cid.is_some()
    }
}
