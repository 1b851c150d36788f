//! Error types for the deal submission engine.
//!
//! Errors are split by the collaborator they come from: the storage node's
//! proposal interface, the coordination service, and the engine's own
//! orchestration failures.

use autodeal_artifacts::ArtifactError;
use thiserror::Error;

/// Substring the storage node puts in its error text when a proposal with
/// the same identifier is already being tracked.
pub const DUPLICATE_TRACKING_MARKER: &str = "already tracking identifier";

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Coordination service errors.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Artifact write errors.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Single-task run finished without a single accepted deal.
    #[error("0 deal(s) sent for task {task_name} ({task_uuid})")]
    NoDealsSent {
        /// Task ID.
        task_uuid: String,
        /// Task name.
        task_name: String,
    },
}

/// Errors returned by the storage node's proposal interface.
#[derive(Debug, Error)]
pub enum ProposalError {
    /// Node is already tracking a proposal with the same identifier.
    #[error("deal proposal already tracking identifier: {0}")]
    DuplicateTracking(String),

    /// Node rejected the proposal.
    #[error("proposal rejected: {0}")]
    Rejected(String),

    /// JSON-RPC level error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// Transport failure talking to the node.
    #[error("node connection failed: {0}")]
    Connection(String),

    /// Response could not be decoded.
    #[error("invalid node response: {0}")]
    Decode(String),
}

/// Errors talking to the coordination service.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// HTTP transport failure.
    #[error("coordinator request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success envelope.
    #[error("coordinator rejected request: {0}")]
    Rejected(String),

    /// Task not known to the service.
    #[error("task not found: {task_uuid}")]
    TaskNotFound {
        /// Task ID that was not found.
        task_uuid: String,
    },

    /// Summary file could not be read for upload.
    #[error("failed to read artifact for upload: {0}")]
    Io(#[from] std::io::Error),

    /// Response could not be decoded.
    #[error("invalid coordinator response: {0}")]
    Decode(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for proposal operations.
pub type ProposalResult<T> = Result<T, ProposalError>;

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::NoDealsSent {
            task_uuid: "7f3c".to_string(),
            task_name: "dataset-a".to_string(),
        };
        assert_eq!(err.to_string(), "0 deal(s) sent for task dataset-a (7f3c)");

        let err = ProposalError::DuplicateTracking("deal 1".to_string());
        assert!(err.to_string().contains(DUPLICATE_TRACKING_MARKER));
    }

    #[test]
    fn test_error_conversion() {
        let coordinator_err = CoordinatorError::Rejected("bad status".to_string());
        let engine_err: EngineError = coordinator_err.into();
        assert!(matches!(engine_err, EngineError::Coordinator(_)));

        let artifact_err = ArtifactError::InvalidOutputDir("empty".to_string());
        let engine_err: EngineError = artifact_err.into();
        assert!(matches!(engine_err, EngineError::Artifact(_)));
    }

    fn origin(err: &EngineError) -> &'static str {
        match err {
            EngineError::Coordinator(_) => "coordinator",
            EngineError::Artifact(_) => "artifact",
            EngineError::NoDealsSent { .. } => "run",
        }
    }

    #[test]
    fn test_engine_error_origin() {
        let err: EngineError = CoordinatorError::TaskNotFound {
            task_uuid: "7f3c".to_string(),
        }
        .into();
        assert_eq!(origin(&err), "coordinator");

        let err = EngineError::NoDealsSent {
            task_uuid: "7f3c".to_string(),
            task_name: "dataset-a".to_string(),
        };
        assert_eq!(origin(&err), "run");
    }
}
