//! Durable artifacts for deal submission batches
//!
//! Every task processed by the engine leaves three files in the output
//! directory, all derived from the same list of [`DealRecord`]s:
//!
//! - `<task>-autodeal-deals.json`: full records, pretty-printed JSON
//! - `<task>-autodeal-deals.csv`: full records, one row per offer
//! - `<task>_autodeal.csv`: flat summary uploaded with the status report
//!
//! The summary is always written last, so its presence means the other two
//! exist as well.

mod dir;
mod summary;

use autodeal_types::DealRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use dir::ensure_output_dir;
pub use summary::SummaryRow;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid output directory: {0}")]
    InvalidOutputDir(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}

/// Paths of the files written for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArtifacts {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    pub summary_path: PathBuf,
}

/// File names used for a task's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub json: String,
    pub csv: String,
    pub summary: String,
}

impl ArtifactNames {
    pub fn for_task(task_name: &str) -> Self {
        let stem = dir::sanitize_file_stem(task_name);
        Self {
            json: format!("{stem}-autodeal-deals.json"),
            csv: format!("{stem}-autodeal-deals.csv"),
            summary: format!("{stem}_autodeal.csv"),
        }
    }
}

/// Writes task artifacts below a fixed output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn ensure_output_dir(&self) -> Result<(), ArtifactError> {
        ensure_output_dir(&self.output_dir).await
    }

    /// Write both list views and then the summary for one task.
    pub async fn write_task(
        &self,
        task_name: &str,
        records: &[DealRecord],
    ) -> Result<TaskArtifacts, ArtifactError> {
        let names = ArtifactNames::for_task(task_name);
        let (json_path, csv_path) =
            write_record_lists(records, &self.output_dir, &names.json, &names.csv).await?;
        let summary_path = write_task_summary(records, &self.output_dir, &names.summary).await?;

        info!(
            task = %task_name,
            records = records.len(),
            summary = %summary_path.display(),
            "Task artifacts written"
        );

        Ok(TaskArtifacts {
            json_path,
            csv_path,
            summary_path,
        })
    }
}

/// Column names of the full record CSV, in [`DealRecord`] field order.
const RECORD_HEADERS: [&str; 14] = [
    "task_uuid",
    "miner_fid",
    "offer_id",
    "car_file_url",
    "car_file_md5",
    "start_epoch",
    "piece_cid",
    "payload_cid",
    "file_size",
    "piece_size",
    "cost",
    "deal_cid",
    "state",
    "attempts",
];

/// Write the full record list as JSON and CSV.
///
/// An empty list still gets a CSV header row.
pub async fn write_record_lists(
    records: &[DealRecord],
    output_dir: &Path,
    json_name: &str,
    csv_name: &str,
) -> Result<(PathBuf, PathBuf), ArtifactError> {
    let json = serde_json::to_vec_pretty(records)?;
    let json_path = dir::write_atomic(output_dir, json_name, &json).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(RECORD_HEADERS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    let csv = writer
        .into_inner()
        .map_err(|e| ArtifactError::Io(e.into_error()))?;
    let csv_path = dir::write_atomic(output_dir, csv_name, &csv).await?;

    debug!(
        json = %json_path.display(),
        csv = %csv_path.display(),
        "Record lists written"
    );
    Ok((json_path, csv_path))
}

/// Write the flat summary CSV and return its path.
pub async fn write_task_summary(
    records: &[DealRecord],
    output_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, ArtifactError> {
    let csv = summary::render_summary(records)?;
    dir::write_atomic(output_dir, file_name, &csv).await
}
