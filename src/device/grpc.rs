use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Endpoint;
use tonic::{Code, Request, Status};

use crate::device::proto::{DeviceServiceClient, Empty, TestRequest};
use crate::device::{DeviceId, DeviceService};
use crate::error::{DispatcherError, Result};
use crate::scheduler::job::WorkItem;

/// [`DeviceService`] backed by the remote `device.DeviceService` gRPC API.
#[derive(Debug, Clone)]
pub struct GrpcDeviceClient {
    address: String,
    client: DeviceServiceClient,
}

impl GrpcDeviceClient {
    /// Build a client without connecting; the channel dials on first use and
    /// reconnects on its own after failures.
    pub fn connect_lazy(address: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(address.to_string())?.connect_lazy();
        tracing::info!(address, "Device service client created");
        Ok(Self {
            address: address.to_string(),
            client: DeviceServiceClient::new(channel),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn probe_error(status: Status, timeout: Duration) -> DispatcherError {
    if status.code() == Code::DeadlineExceeded {
        DispatcherError::ProbeTimeout(timeout)
    } else {
        DispatcherError::ProbeUnavailable(status.message().to_string())
    }
}

#[async_trait]
impl DeviceService for GrpcDeviceClient {
    async fn list_free_devices(&self, timeout: Duration) -> Result<Vec<DeviceId>> {
        let mut client = self.client.clone();
        let mut request = Request::new(Empty {});
        request.set_timeout(timeout);

        let response = tokio::time::timeout(timeout, client.get_device_list(request))
            .await
            .map_err(|_| DispatcherError::ProbeTimeout(timeout))?
            .map_err(|status| probe_error(status, timeout))?;

        Ok(response
            .into_inner()
            .devices
            .into_iter()
            .map(|d| d.device_id)
            .collect())
    }

    async fn dispatch(
        &self,
        device_id: DeviceId,
        item: WorkItem,
        timeout: Duration,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let mut request = Request::new(TestRequest {
            device_id,
            source_id: item.source_id,
            test_number: item.request_id,
        });
        request.set_timeout(timeout);

        match tokio::time::timeout(timeout, client.send_test(request)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => Err(DispatcherError::Dispatch {
                device_id,
                reason: status.message().to_string(),
            }),
            Err(_) => Err(DispatcherError::Dispatch {
                device_id,
                reason: format!("timed out after {:?}", timeout),
            }),
        }
    }
}
