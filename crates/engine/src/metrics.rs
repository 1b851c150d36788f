//! Prometheus metrics for deal submission

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[derive(Clone)]
pub struct EngineMetrics {
    pub proposal_attempts_total: IntCounter,
    pub deals_submitted_total: IntCounterVec,
    pub tasks_reported_total: IntCounterVec,
    pub task_duration_seconds: Histogram,
}

impl EngineMetrics {
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let metrics = Self::build("autodeal")?;

        registry.register(Box::new(metrics.proposal_attempts_total.clone()))?;
        registry.register(Box::new(metrics.deals_submitted_total.clone()))?;
        registry.register(Box::new(metrics.tasks_reported_total.clone()))?;
        registry.register(Box::new(metrics.task_duration_seconds.clone()))?;

        Ok(metrics)
    }

    #[cfg(test)]
    pub fn new_unregistered() -> Self {
        Self::build("test_autodeal").unwrap()
    }

    fn build(prefix: &str) -> Result<Self, MetricsError> {
        let proposal_attempts_total = IntCounter::with_opts(Opts::new(
            format!("{prefix}_proposal_attempts_total"),
            "Total number of deal proposal calls made to the storage node",
        ))?;

        let deals_submitted_total = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_deals_submitted_total"),
                "Deal offers that finished the submission driver, by outcome",
            ),
            &["outcome"],
        )?;

        let tasks_reported_total = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_tasks_reported_total"),
                "Task status reports sent to the coordination service",
            ),
            &["status"],
        )?;

        let task_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            format!("{prefix}_task_duration_seconds"),
            "Time spent reconciling one task",
        ))?;

        Ok(Self {
            proposal_attempts_total,
            deals_submitted_total,
            tasks_reported_total,
            task_duration_seconds,
        })
    }
}
