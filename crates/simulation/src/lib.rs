//! # Autodeal Simulation Crate
//!
//! End-to-end test harness for the deal submission engine. Runs the real
//! [`autodeal_engine::AutoDealService`] against an in-memory coordination
//! service and storage node, with artifacts written to a temporary
//! directory.
//!
//! ## Features
//!
//! - **No network**: Mock coordinator and node replace the HTTP clients
//! - **Scripted node**: Per-offer response scripts (accept, pending,
//!   duplicate, reject)
//! - **Fault injection**: Failing task fetches, listings and reports
//! - **Reusable scenarios**: Pre-built scenarios with verification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use autodeal_simulation::{Scenario, TestHarness};
//!
//! #[tokio::test]
//! async fn test_partial_failure() {
//!     let mut harness = TestHarness::new();
//!     let result = Scenario::PartialFailure.run(&mut harness).await;
//!     Scenario::PartialFailure.verify(&result).unwrap();
//! }
//! ```

pub mod harness;
pub mod mocks;
pub mod scenarios;

pub use harness::{HarnessMetrics, TestHarness};
pub use mocks::{MockCoordinator, MockProposer, NodeResponse};
pub use scenarios::{Scenario, ScenarioFailure, ScenarioResult};
