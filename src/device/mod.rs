//! Remote execution devices.
//!
//! The scheduler only sees the [`DeviceService`] trait: a probe listing free
//! devices and a sink accepting one work item per device. The production
//! implementation is [`GrpcDeviceClient`], speaking the `device.DeviceService`
//! gRPC API. Every call carries a deadline so one slow device cannot stall a
//! request or a dispatch tick.

pub mod grpc;
pub mod proto;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::job::WorkItem;

pub use grpc::GrpcDeviceClient;

pub type DeviceId = u32;

#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Devices currently able to accept a test, in the order reported.
    async fn list_free_devices(&self, timeout: Duration) -> Result<Vec<DeviceId>>;

    /// Hand `item` to `device_id` for execution.
    async fn dispatch(&self, device_id: DeviceId, item: WorkItem, timeout: Duration)
        -> Result<()>;
}
