//! Integration tests for the deal submission engine.
//!
//! These tests run the real HTTP clients against mock coordination and
//! node servers.

use autodeal_artifacts::ArtifactWriter;
use autodeal_engine::{
    AutoDealService, CoordinationClient, DriverConfig, EngineError, NodeProposer,
    NodeProposerConfig, SubmissionDriver, TaskReconciler,
};
use autodeal_types::{DealDefaults, DealRecord, SubmissionState, TaskStatus};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const TASK_UUID: &str = "2c6f0d6e-1f43-4a57-9d3b-9b1d2f0a7c11";

/// Helper to create test deal defaults.
fn make_test_defaults() -> DealDefaults {
    DealDefaults {
        sender_wallet: "f3sender".to_string(),
        price_per_gib: "0.0000001".parse().unwrap(),
        start_epoch_hours: 2,
        ..DealDefaults::default()
    }
}

/// Helper to build a service against the two mock servers.
fn make_service(
    coordinator: &ServerGuard,
    node: &ServerGuard,
    output_dir: &std::path::Path,
) -> AutoDealService<CoordinationClient, NodeProposer> {
    let client = CoordinationClient::new(&coordinator.url()).unwrap();
    let proposer = NodeProposer::new(NodeProposerConfig {
        rpc_url: node.url(),
        auth_token: Some("node-token".to_string()),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();
    let driver = SubmissionDriver::new(DriverConfig {
        max_attempts: 3,
        retry_delay: Duration::ZERO,
    });
    let reconciler =
        TaskReconciler::new(make_test_defaults(), driver, ArtifactWriter::new(output_dir));
    AutoDealService::new(client, proposer, reconciler)
}

async fn mock_task_listing(server: &mut Server) {
    server
        .mock("GET", "/tasks/assigned")
        .with_body(
            json!({
                "status": "success",
                "message": "",
                "data": [{"uuid": TASK_UUID, "task_name": "genome-set", "miner_fid": "f09999"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    server
        .mock("GET", format!("/tasks/{TASK_UUID}/deals").as_str())
        .with_body(
            json!({
                "status": "success",
                "message": "",
                "data": {
                    "task": {"uuid": TASK_UUID, "task_name": "genome-set", "miner_fid": "f09999"},
                    "deal": [
                        {"id": 1, "file_size": "1048576", "piece_cid": "baga1", "payload_cid": "bafy1",
                         "file_source_url": "https://cdn.example/1.car", "md5_origin": "m1", "start_epoch": 0},
                        {"id": 2, "file_size": "5000", "piece_cid": "baga2", "payload_cid": "bafy2",
                         "file_source_url": "https://cdn.example/2.car", "md5_origin": "m2", "start_epoch": 0}
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
}

async fn mock_chain_head(server: &mut Server) {
    server
        .mock("POST", "/")
        .match_header("authorization", "Bearer node-token")
        .match_body(Matcher::PartialJson(json!({"method": "Filecoin.ChainHead"})))
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"Height":10000}}"#)
        .create_async()
        .await;
}

/// Test a full batch where the node accepts every deal.
#[tokio::test]
async fn test_batch_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let mut coordinator = Server::new_async().await;
    let mut node = Server::new_async().await;

    mock_task_listing(&mut coordinator).await;
    let report = coordinator
        .mock("POST", format!("/tasks/{TASK_UUID}/status").as_str())
        .match_body(Matcher::Regex("DealSent".to_string()))
        .with_body(r#"{"status":"success","message":"task updated","data":null}"#)
        .expect(1)
        .create_async()
        .await;

    mock_chain_head(&mut node).await;
    node.mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({"method": "Filecoin.ClientStartDeal"}),
        ))
        .with_body(r#"{"jsonrpc":"2.0","id":2,"result":{"/":"bafyreideal"}}"#)
        .expect(2)
        .create_async()
        .await;

    let mut service = make_service(&coordinator, &node, temp_dir.path());
    let summary = service.run_batch().await.unwrap();

    report.assert_async().await;
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.deals_sent(), 2);

    let outcome = &summary.completed[0];
    assert!(outcome.reported);
    assert_eq!(outcome.status, Some(TaskStatus::DealSent));

    // 2 hours ahead of the chain head, first attempt.
    assert_eq!(outcome.records[0].start_epoch, 10_240);
    assert_eq!(outcome.records[0].piece_size, 2 * 1024 * 1024);
    assert_eq!(outcome.records[1].piece_size, 256 * 1024);

    let json = std::fs::read_to_string(temp_dir.path().join("genome-set-autodeal-deals.json"))
        .unwrap();
    let records: Vec<DealRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(records.len(), 2);
    assert!(temp_dir.path().join("genome-set-autodeal-deals.csv").exists());

    let summary_csv =
        std::fs::read_to_string(temp_dir.path().join("genome-set_autodeal.csv")).unwrap();
    assert_eq!(summary_csv.lines().count(), 3);
    assert!(summary_csv.contains("bafyreideal"));
}

/// Test that a node stuck on duplicate identifiers yields no report.
#[tokio::test]
async fn test_batch_duplicate_tracking_exhausts() {
    let temp_dir = TempDir::new().unwrap();
    let mut coordinator = Server::new_async().await;
    let mut node = Server::new_async().await;

    mock_task_listing(&mut coordinator).await;
    let report = coordinator
        .mock("POST", format!("/tasks/{TASK_UUID}/status").as_str())
        .expect(0)
        .create_async()
        .await;

    mock_chain_head(&mut node).await;
    let start_deal = node
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({"method": "Filecoin.ClientStartDeal"}),
        ))
        .with_body(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":1,"message":"already tracking identifier bafy"}}"#,
        )
        .expect(6)
        .create_async()
        .await;

    let mut service = make_service(&coordinator, &node, temp_dir.path());
    let summary = service.run_batch().await.unwrap();

    start_deal.assert_async().await;
    report.assert_async().await;

    let outcome = &summary.completed[0];
    assert_eq!(outcome.status, None);
    assert!(outcome
        .records
        .iter()
        .all(|r| r.state == SubmissionState::Exhausted && r.attempts == 3));
}

/// Test that the single-task path reports zero deals as an error.
#[tokio::test]
async fn test_single_task_no_deals_sent() {
    let temp_dir = TempDir::new().unwrap();
    let mut coordinator = Server::new_async().await;
    let mut node = Server::new_async().await;

    mock_task_listing(&mut coordinator).await;
    mock_chain_head(&mut node).await;
    node.mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({"method": "Filecoin.ClientStartDeal"}),
        ))
        .with_body(r#"{"jsonrpc":"2.0","id":2,"error":{"code":1,"message":"wallet has no funds"}}"#)
        .create_async()
        .await;

    let mut service = make_service(&coordinator, &node, temp_dir.path());
    let err = service.run_single(TASK_UUID).await.unwrap_err();

    assert!(matches!(err, EngineError::NoDealsSent { .. }));
    assert!(err.to_string().contains("genome-set"));
    assert!(temp_dir.path().join("genome-set_autodeal.csv").exists());
}

/// Test that an unreachable coordinator aborts the batch.
#[tokio::test]
async fn test_batch_listing_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut coordinator = Server::new_async().await;
    let node = Server::new_async().await;

    coordinator
        .mock("GET", "/tasks/assigned")
        .with_status(503)
        .create_async()
        .await;

    let mut service = make_service(&coordinator, &node, temp_dir.path());
    let err = service.run_batch().await.unwrap_err();

    assert!(matches!(err, EngineError::Coordinator(_)));
}
