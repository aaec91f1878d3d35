//! Best-effort outbound event sinks.
//!
//! - [`TelemetrySink`]: queue occupancy events emitted on admission
//! - [`ReportSink`]: notifications about items pushed out to overflow
//!
//! Both are fire-and-forget: implementations log delivery failures and never
//! hand them back to the admission path.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scheduler::job::WorkItem;

pub use http::{HttpReportSink, HttpTelemetrySink};

/// Queue occupancy as seen by one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyEvent {
    pub available_space: i64,
    pub max_size: i64,
}

impl OccupancyEvent {
    pub fn new(available_space: u32, max_size: u32) -> Self {
        Self {
            available_space: i64::from(available_space),
            max_size: i64::from(max_size),
        }
    }
}

/// Ingress-shaped copy of a work item (`test_number` is the request id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRequestBody {
    pub source_id: u32,
    pub test_number: u32,
}

impl From<WorkItem> for TestRequestBody {
    fn from(item: WorkItem) -> Self {
        Self {
            source_id: item.source_id,
            test_number: item.request_id,
        }
    }
}

impl From<TestRequestBody> for WorkItem {
    fn from(body: TestRequestBody) -> Self {
        WorkItem::new(body.source_id, body.test_number)
    }
}

/// Outcome notice for an item that left the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowReport {
    pub test_req: TestRequestBody,
    /// False for evicted items: they were never executed.
    pub status: bool,
}

impl OverflowReport {
    pub fn evicted(item: WorkItem) -> Self {
        Self {
            test_req: item.into(),
            status: false,
        }
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, event: OccupancyEvent);
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, report: OverflowReport);
}

/// Sink used when no endpoint is configured: events only reach the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn publish(&self, event: OccupancyEvent) {
        tracing::info!(
            available_space = event.available_space,
            max_size = event.max_size,
            "Queue occupancy"
        );
    }
}

#[async_trait]
impl ReportSink for LogSink {
    async fn report(&self, report: OverflowReport) {
        tracing::info!(
            source_id = report.test_req.source_id,
            test_number = report.test_req.test_number,
            dispatched = report.status,
            "Overflow report"
        );
    }
}
