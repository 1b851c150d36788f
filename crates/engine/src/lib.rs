//! # Auto-bid Deal Submission
//!
//! This crate implements the deal-submission reconciliation loop for a
//! storage provider: tasks assigned by the coordination service are turned
//! into deal proposals against the local storage node, and the outcome of
//! every task is written to disk and reported back.
//!
//! ## Architecture
//!
//! ```text
//! AutoDealService → TaskReconciler → SubmissionDriver → ProposerTrait
//!        ↓                 ↓
//! CoordinatorTrait    ArtifactWriter
//! ```
//!
//! ## Components
//!
//! - [`AutoDealService`]: Task fetch loop, batch and single-task entry points
//! - [`TaskReconciler`]: Submits a task's offers, writes artifacts, decides status
//! - [`SubmissionDriver`]: Bounded-retry proposal of one offer
//! - [`NodeProposer`]: JSON-RPC client for the storage node
//! - [`CoordinationClient`]: HTTP client for the coordination service
//!
//! ## Task Lifecycle
//!
//! 1. List tasks assigned to this provider
//! 2. Fetch the task's metadata and pending offers
//! 3. For each offer: build and validate the deal config, size the piece,
//!    price it, and propose it (up to 60 attempts)
//! 4. Write `<task>-autodeal-deals.json`, `<task>-autodeal-deals.csv` and
//!    finally `<task>_autodeal.csv`
//! 5. Report `DealSent` or `ProgressWithFailure` with the summary attached,
//!    or nothing if no deal was accepted
//!
//! ## Example
//!
//! ```rust,ignore
//! use autodeal_artifacts::ArtifactWriter;
//! use autodeal_engine::{
//!     AutoDealService, CoordinationClient, NodeProposer, NodeProposerConfig,
//!     SubmissionDriver, TaskReconciler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let coordinator = CoordinationClient::new("https://coordinator.example/api")?;
//!     let proposer = NodeProposer::new(NodeProposerConfig::default())?;
//!     let reconciler = TaskReconciler::new(
//!         defaults,
//!         SubmissionDriver::default(),
//!         ArtifactWriter::new("/var/lib/autodeal/output"),
//!     );
//!
//!     let mut service = AutoDealService::new(coordinator, proposer, reconciler);
//!     let summary = service.run_batch().await?;
//!     println!("{} deal(s) sent", summary.deals_sent());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod coordinator;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod proposer;
pub mod reconciler;
pub mod service;
pub mod sizing;

// Re-export main types
pub use coordinator::{CoordinationClient, CoordinatorTrait, ReportAck};
pub use driver::{
    classify_attempt, AttemptOutcome, DriverConfig, SubmissionDriver, MAX_PROPOSAL_ATTEMPTS,
};
pub use error::{
    CoordinatorError, CoordinatorResult, EngineError, EngineResult, ProposalError,
    ProposalResult, DUPLICATE_TRACKING_MARKER,
};
pub use metrics::{EngineMetrics, MetricsError};
pub use proposer::{NodeProposer, NodeProposerConfig, Proposal, ProposerTrait};
pub use reconciler::{decide_status, OfferOutcome, TaskOutcome, TaskReconciler};
pub use service::{AutoDealService, BatchSummary, TaskFailure};
pub use sizing::{compute_cost, compute_piece_size, PieceSize, SizingError, MIN_PIECE_SIZE};
