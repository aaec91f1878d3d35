use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::DeviceService;
use crate::scheduler::queue::SlotQueue;

/// Counters for one tick that reached the drain step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub free_devices: usize,
    pub dispatched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Probe failed or timed out; nothing was attempted.
    ProbeFailed,
    /// Occupancy could not be read.
    StorageFailed,
    /// Nothing queued.
    QueueEmpty,
    Drained(TickReport),
}

/// Background task that drains the queue onto free devices.
pub struct DispatchLoop {
    queue: Arc<SlotQueue>,
    devices: Arc<dyn DeviceService>,
    interval: Duration,
    deadline: Duration,
}

impl DispatchLoop {
    /// `deadline` bounds all remote calls of a single tick.
    pub fn new(
        queue: Arc<SlotQueue>,
        devices: Arc<dyn DeviceService>,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            queue,
            devices,
            interval,
            deadline,
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// Cancellation is only observed between ticks, so a tick that already
    /// started always finishes its storage writes.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            max_size = self.queue.max_size(),
            "Dispatch loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Dispatch loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One probe-and-drain pass.
    pub async fn tick(&self) -> TickOutcome {
        let deadline = Instant::now() + self.deadline;

        let devices = match self.devices.list_free_devices(self.deadline).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::debug!(error = %e, "Device probe failed, skipping tick");
                return TickOutcome::ProbeFailed;
            }
        };

        let available = match self.queue.available_space().await {
            Ok(available) => available,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read queue occupancy");
                return TickOutcome::StorageFailed;
            }
        };
        if available == self.queue.max_size() {
            return TickOutcome::QueueEmpty;
        }

        tracing::debug!(
            available_space = available,
            free_devices = ?devices,
            "Draining queue onto free devices"
        );

        let mut report = TickReport {
            free_devices: devices.len(),
            ..TickReport::default()
        };

        for device_id in devices {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!("Tick deadline reached, deferring remaining devices");
                break;
            }

            let entry = match self.queue.pop_oldest().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read oldest queued item");
                    break;
                }
            };

            match self.devices.dispatch(device_id, entry.item, remaining).await {
                Ok(()) => {
                    report.dispatched += 1;
                    tracing::info!(
                        device_id,
                        slot = entry.slot,
                        source_id = entry.item.source_id,
                        request_id = entry.item.request_id,
                        "Queued item dispatched"
                    );
                    match self.queue.delete_entry(&entry).await {
                        Ok(true) => {}
                        Ok(false) => tracing::warn!(
                            slot = entry.slot,
                            "Dispatched item was evicted in flight, slot left to its new entry"
                        ),
                        Err(e) => {
                            tracing::error!(slot = entry.slot, error = %e, "Failed to delete dispatched slot")
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(device_id, slot = entry.slot, error = %e, "Dispatch failed, item stays queued");
                }
            }
        }

        TickOutcome::Drained(report)
    }
}
