//! Client for the coordination service.
//!
//! The service hands out tasks assigned to this provider, lists the deal
//! offers of each task, and accepts a status report with the task summary
//! attached. Every response is wrapped in a `{status, message, data}`
//! envelope.

use crate::error::{CoordinatorError, CoordinatorResult};
use async_trait::async_trait;
use autodeal_types::{DealOffer, Task, TaskStatus};
use reqwest::multipart;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Envelope status for a successful call.
const STATUS_SUCCESS: &str = "success";

/// Acknowledgement of a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportAck {
    pub message: String,
}

/// Trait for the coordination service.
///
/// This trait enables mock implementations for testing without requiring
/// a live service.
#[async_trait]
pub trait CoordinatorTrait: Send {
    /// Tasks currently assigned to this provider.
    async fn list_assigned_tasks(&mut self) -> CoordinatorResult<Vec<Task>>;

    /// The task's metadata together with its pending offers.
    async fn list_offered_deals(&mut self, task_uuid: &str)
        -> CoordinatorResult<(Task, Vec<DealOffer>)>;

    /// Report the task's status and upload its summary file.
    async fn report_task_status(
        &mut self,
        task_uuid: &str,
        status: TaskStatus,
        summary_path: &Path,
    ) -> CoordinatorResult<ReportAck>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> CoordinatorResult<Option<T>> {
        if self.status != STATUS_SUCCESS {
            return Err(CoordinatorError::Rejected(self.message));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
struct OfferedDeals {
    task: Task,
    #[serde(default)]
    deal: Vec<DealOffer>,
}

/// HTTP client for the coordination service.
#[derive(Debug, Clone)]
pub struct CoordinationClient {
    base_url: String,
    client: Client,
}

impl CoordinationClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str) -> CoordinatorResult<Self> {
        if base_url.trim().is_empty() {
            return Err(CoordinatorError::Rejected(
                "coordinator URL is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> CoordinatorResult<Envelope<T>> {
        let text = response.error_for_status()?.text().await?;
        serde_json::from_str(&text).map_err(|e| CoordinatorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CoordinatorTrait for CoordinationClient {
    async fn list_assigned_tasks(&mut self) -> CoordinatorResult<Vec<Task>> {
        let response = self.client.get(self.endpoint("tasks/assigned")).send().await?;
        let tasks: Option<Vec<Task>> = Self::decode(response).await?.into_data()?;
        let tasks = tasks.unwrap_or_default();

        debug!(count = tasks.len(), "Fetched assigned tasks");
        Ok(tasks)
    }

    async fn list_offered_deals(
        &mut self,
        task_uuid: &str,
    ) -> CoordinatorResult<(Task, Vec<DealOffer>)> {
        let response = self
            .client
            .get(self.endpoint(&format!("tasks/{task_uuid}/deals")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CoordinatorError::TaskNotFound {
                task_uuid: task_uuid.to_string(),
            });
        }

        let data: OfferedDeals = Self::decode(response)
            .await?
            .into_data()?
            .ok_or_else(|| CoordinatorError::TaskNotFound {
                task_uuid: task_uuid.to_string(),
            })?;

        debug!(
            task_id = %task_uuid,
            offers = data.deal.len(),
            "Fetched offered deals"
        );
        Ok((data.task, data.deal))
    }

    async fn report_task_status(
        &mut self,
        task_uuid: &str,
        status: TaskStatus,
        summary_path: &Path,
    ) -> CoordinatorResult<ReportAck> {
        let contents = tokio::fs::read(summary_path).await?;
        let file_name = summary_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "summary.csv".to_string());

        let form = multipart::Form::new()
            .text("status", status.as_str())
            .part("file", multipart::Part::bytes(contents).file_name(file_name));

        let response = self
            .client
            .post(self.endpoint(&format!("tasks/{task_uuid}/status")))
            .multipart(form)
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = Self::decode(response).await?;
        let message = envelope.message.clone();
        envelope.into_data()?;

        Ok(ReportAck { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_endpoint_normalization() {
        let client = CoordinationClient::new("http://coordinator.local/api/").unwrap();
        assert_eq!(
            client.endpoint("/tasks/assigned"),
            "http://coordinator.local/api/tasks/assigned"
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            CoordinationClient::new("  "),
            Err(CoordinatorError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_list_assigned_tasks() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks/assigned")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","message":"","data":[
                    {"uuid":"a","task_name":"alpha","miner_fid":"f01"},
                    {"uuid":"b","task_name":"beta"}
                ]}"#,
            )
            .create_async()
            .await;

        let mut client = CoordinationClient::new(&server.url()).unwrap();
        let tasks = client.list_assigned_tasks().await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].miner_fid.as_deref(), Some("f01"));
        assert_eq!(tasks[1].miner_fid, None);
    }

    #[tokio::test]
    async fn test_rejected_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks/assigned")
            .with_body(r#"{"status":"fail","message":"provider unknown","data":null}"#)
            .create_async()
            .await;

        let mut client = CoordinationClient::new(&server.url()).unwrap();
        let err = client.list_assigned_tasks().await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Rejected(ref m) if m == "provider unknown"));
    }

    #[tokio::test]
    async fn test_list_offered_deals() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tasks/a/deals")
            .with_body(
                r#"{"status":"success","message":"","data":{
                    "task":{"uuid":"a","task_name":"alpha","miner_fid":"f01","type":"verified"},
                    "deal":[{"id":7,"file_size":"2048","piece_cid":"baga","payload_cid":"bafy",
                             "file_source_url":"https://example.org/7.car","md5_origin":"abc",
                             "start_epoch":0}]
                }}"#,
            )
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/tasks/zz/deals")
            .with_status(404)
            .create_async()
            .await;

        let mut client = CoordinationClient::new(&server.url()).unwrap();
        let (task, offers) = client.list_offered_deals("a").await.unwrap();
        assert_eq!(task.task_name, "alpha");
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].file_size_bytes(), 2048);

        let err = client.list_offered_deals("zz").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn test_report_uploads_summary() {
        let temp_dir = TempDir::new().unwrap();
        let summary = temp_dir.path().join("alpha_autodeal.csv");
        std::fs::write(&summary, "uuid,miner_id\na,f01\n").unwrap();

        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/tasks/a/status")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("ProgressWithFailure".to_string()),
                mockito::Matcher::Regex("alpha_autodeal.csv".to_string()),
            ]))
            .with_body(r#"{"status":"success","message":"updated","data":null}"#)
            .create_async()
            .await;

        let mut client = CoordinationClient::new(&server.url()).unwrap();
        let ack = client
            .report_task_status("a", TaskStatus::ProgressWithFailure, &summary)
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(ack.message, "updated");
    }
}
