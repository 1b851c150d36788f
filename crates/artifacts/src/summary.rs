//! Flat per-task CSV uploaded to the coordination service with the status
//! report.

use autodeal_types::DealRecord;
use serde::Serialize;

/// One row of the task summary.
#[derive(Debug, Serialize)]
pub struct SummaryRow<'a> {
    pub uuid: &'a str,
    pub miner_id: &'a str,
    pub deal_cid: &'a str,
    pub payload_cid: &'a str,
    pub file_source_url: &'a str,
    pub md5: &'a str,
    pub start_epoch: i64,
    pub piece_cid: &'a str,
    pub file_size: i64,
    pub cost: String,
}

impl<'a> From<&'a DealRecord> for SummaryRow<'a> {
    fn from(record: &'a DealRecord) -> Self {
        Self {
            uuid: &record.task_uuid,
            miner_id: &record.miner_fid,
            deal_cid: record.deal_cid.as_deref().unwrap_or(""),
            payload_cid: &record.payload_cid,
            file_source_url: &record.car_file_url,
            md5: &record.car_file_md5,
            start_epoch: record.start_epoch,
            piece_cid: &record.piece_cid,
            file_size: record.file_size,
            cost: record.cost.to_string(),
        }
    }
}

pub(crate) fn render_summary(records: &[DealRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(SUMMARY_HEADERS)?;
    }
    for record in records {
        writer.serialize(SummaryRow::from(record))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

const SUMMARY_HEADERS: [&str; 10] = [
    "uuid",
    "miner_id",
    "deal_cid",
    "payload_cid",
    "file_source_url",
    "md5",
    "start_epoch",
    "piece_cid",
    "file_size",
    "cost",
];

#[cfg(test)]
mod tests {
    use super::*;
    use autodeal_types::{SubmissionState, TokenAmount};

    fn record(deal_cid: Option<&str>) -> DealRecord {
        DealRecord {
            task_uuid: "task-1".to_string(),
            miner_fid: "f01234".to_string(),
            offer_id: 7,
            car_file_url: "https://example.org/a.car".to_string(),
            car_file_md5: "abc".to_string(),
            start_epoch: 4000,
            piece_cid: "baga".to_string(),
            payload_cid: "bafy".to_string(),
            file_size: 2048,
            piece_size: 262_144,
            cost: "0.5".parse::<TokenAmount>().unwrap(),
            deal_cid: deal_cid.map(str::to_string),
            state: SubmissionState::Succeeded,
            attempts: 1,
        }
    }

    #[test]
    fn test_render_summary_rows() {
        let bytes = render_summary(&[record(Some("bafydeal")), record(None)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADERS.join(","));
        assert!(lines[1].contains("bafydeal"));
        assert!(lines[1].ends_with(",0.5"));
        assert!(lines[2].starts_with("task-1,f01234,,bafy"));
    }

    #[test]
    fn test_render_empty_summary_has_header() {
        let bytes = render_summary(&[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap().trim_end(),
            SUMMARY_HEADERS.join(",")
        );
    }
}
