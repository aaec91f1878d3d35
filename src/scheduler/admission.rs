use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceId, DeviceService};
use crate::error::Result;
use crate::scheduler::job::{TrashEntry, WorkItem};
use crate::scheduler::mailbox::OverflowMailbox;
use crate::scheduler::queue::SlotQueue;
use crate::sink::{OccupancyEvent, OverflowReport, ReportSink, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Queue the item when direct dispatch to a free device fails.
    pub fallback_on_dispatch_failure: bool,
    /// Deadline for each device probe and dispatch call.
    pub device_timeout: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            fallback_on_dispatch_failure: false,
            device_timeout: Duration::from_secs(1),
        }
    }
}

/// What happened to one incoming item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Sent straight to a free device; the queue was never touched.
    Dispatched { device_id: DeviceId },
    /// Buffered in the queue.
    Enqueued { slot: u32 },
    /// The queue was full; the item was buffered after evicting the oldest
    /// entry. `reported` is what the overflow mailbox handed out afterwards.
    Overflow {
        slot: u32,
        reported: Option<TrashEntry>,
    },
    /// Direct dispatch failed and the item was buffered instead.
    FellBack { device_id: DeviceId, slot: u32 },
    /// Direct dispatch failed and the item was not buffered.
    DispatchFailed { device_id: DeviceId, reason: String },
}

impl Admission {
    /// True when the item was either executed or is safely buffered.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Admission::DispatchFailed { .. })
    }
}

/// Per-request policy: bypass the queue, enqueue, or enqueue with eviction,
/// depending on how full the queue is.
pub struct AdmissionController {
    queue: Arc<SlotQueue>,
    mailbox: Arc<OverflowMailbox>,
    devices: Arc<dyn DeviceService>,
    telemetry: Arc<dyn TelemetrySink>,
    reports: Arc<dyn ReportSink>,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    pub fn new(
        queue: Arc<SlotQueue>,
        mailbox: Arc<OverflowMailbox>,
        devices: Arc<dyn DeviceService>,
        telemetry: Arc<dyn TelemetrySink>,
        reports: Arc<dyn ReportSink>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            queue,
            mailbox,
            devices,
            telemetry,
            reports,
            policy,
        }
    }

    pub fn queue(&self) -> &Arc<SlotQueue> {
        &self.queue
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Decide and carry out the fate of `item`.
    ///
    /// Storage errors are returned; device and sink failures are folded into
    /// the returned [`Admission`] or logged.
    pub async fn admit(&self, item: WorkItem) -> Result<Admission> {
        let available = self.queue.available_space().await?;
        let max_size = self.queue.max_size();
        tracing::info!(available_space = available, max_size, "Checked available space");

        if available == 0 {
            self.admit_into_full(item, max_size).await
        } else if available == max_size {
            self.admit_into_empty(item, available, max_size).await
        } else {
            // A backlog exists: never let a new item jump ahead of it.
            let outcome = self.queue.insert(item).await?;
            Ok(Admission::Enqueued { slot: outcome.slot })
        }
    }

    async fn admit_into_full(&self, item: WorkItem, max_size: u32) -> Result<Admission> {
        let inserted = self.queue.insert(item).await;
        if let Err(ref e) = inserted {
            tracing::error!(error = %e, "Failed to queue item into full queue");
        }

        let reported = match self.mailbox.read_pending().await {
            Ok(Some(entry)) => {
                self.reports.report(OverflowReport::evicted(entry.item)).await;
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read overflow mailbox");
                None
            }
        };

        self.telemetry
            .publish(OccupancyEvent::new(0, max_size))
            .await;

        let outcome = inserted?;
        Ok(Admission::Overflow {
            slot: outcome.slot,
            reported,
        })
    }

    async fn admit_into_empty(
        &self,
        item: WorkItem,
        available: u32,
        max_size: u32,
    ) -> Result<Admission> {
        let timeout = self.policy.device_timeout;
        let devices = match self.devices.list_free_devices(timeout).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "Device probe failed, buffering item");
                let outcome = self.queue.insert(item).await?;
                return Ok(Admission::Enqueued { slot: outcome.slot });
            }
        };
        tracing::debug!(free_devices = ?devices, "Probed free devices");

        let event = OccupancyEvent::new(available.saturating_sub(1), max_size);

        let Some(&device_id) = devices.first() else {
            let inserted = self.queue.insert(item).await;
            self.telemetry.publish(event).await;
            return Ok(Admission::Enqueued {
                slot: inserted?.slot,
            });
        };

        let dispatched = self.devices.dispatch(device_id, item, timeout).await;
        self.telemetry.publish(event).await;

        match dispatched {
            Ok(()) => {
                tracing::info!(device_id, "Item dispatched directly");
                Ok(Admission::Dispatched { device_id })
            }
            Err(e) if self.policy.fallback_on_dispatch_failure => {
                tracing::warn!(device_id, error = %e, "Direct dispatch failed, buffering item");
                let outcome = self.queue.insert(item).await?;
                Ok(Admission::FellBack {
                    device_id,
                    slot: outcome.slot,
                })
            }
            Err(e) => {
                tracing::error!(device_id, error = %e, "Direct dispatch failed, item not buffered");
                Ok(Admission::DispatchFailed {
                    device_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}
