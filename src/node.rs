use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::DispatcherConfig;
use crate::device::{DeviceService, GrpcDeviceClient};
use crate::error::Result;
use crate::scheduler::{
    AdmissionController, AdmissionPolicy, DispatchLoop, OverflowMailbox, SlotQueue,
};
use crate::sink::{HttpReportSink, HttpTelemetrySink, LogSink, ReportSink, TelemetrySink};
use crate::storage::Store;

/// The assembled service: store, queue, mailbox, admission and dispatch.
pub struct Dispatcher {
    pub config: DispatcherConfig,
    pub store: Arc<Store>,
    pub queue: Arc<SlotQueue>,
    pub mailbox: Arc<OverflowMailbox>,
    pub admission: Arc<AdmissionController>,
    devices: Arc<dyn DeviceService>,
}

impl Dispatcher {
    /// Build the service against the configured gRPC device endpoint.
    pub async fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let devices = Arc::new(GrpcDeviceClient::connect_lazy(&config.device.address)?);
        Self::with_devices(config, devices).await
    }

    /// Build the service around an arbitrary device backend.
    pub async fn with_devices(
        config: DispatcherConfig,
        devices: Arc<dyn DeviceService>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(match config.storage.path {
            Some(ref path) => Store::open(path.clone()).await?,
            None => {
                tracing::warn!("No storage path configured, queue will not survive restarts");
                Store::in_memory()
            }
        });

        let queue = Arc::new(SlotQueue::open(store.clone(), config.cycle_buffer.max_size).await?);
        let mailbox = Arc::new(OverflowMailbox::new(
            store.clone(),
            config.cycle_buffer.acknowledge_all_on_read,
        ));

        let telemetry: Arc<dyn TelemetrySink> = match config.telemetry.endpoint {
            Some(ref endpoint) => Arc::new(HttpTelemetrySink::new(endpoint)?),
            None => Arc::new(LogSink),
        };
        let reports: Arc<dyn ReportSink> = match config.report.endpoint {
            Some(ref endpoint) => Arc::new(HttpReportSink::new(endpoint)?),
            None => Arc::new(LogSink),
        };

        let policy = AdmissionPolicy {
            fallback_on_dispatch_failure: config.cycle_buffer.fallback_on_dispatch_failure,
            device_timeout: config.device_timeout(),
        };
        let admission = Arc::new(AdmissionController::new(
            queue.clone(),
            mailbox.clone(),
            devices.clone(),
            telemetry,
            reports,
            policy,
        ));

        Ok(Self {
            config,
            store,
            queue,
            mailbox,
            admission,
            devices,
        })
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            admission: self.admission.clone(),
            mailbox: self.mailbox.clone(),
        }
    }

    pub fn dispatch_loop(&self) -> DispatchLoop {
        DispatchLoop::new(
            self.queue.clone(),
            self.devices.clone(),
            self.config.dispatch_interval(),
            self.config.device_timeout(),
        )
    }

    /// Run the dispatch loop and the HTTP ingress until `shutdown` fires.
    ///
    /// If the ingress fails to start or dies, the loop is stopped too and
    /// the ingress error is returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let dispatch_loop = self.dispatch_loop();
        let loop_shutdown = shutdown.clone();
        let loop_handle = tokio::spawn(async move {
            dispatch_loop.run(loop_shutdown).await;
        });

        let app = api::router(self.api_state(), self.config.request_timeout());
        let served = api::run_api(self.config.http_server.address, app, shutdown.clone()).await;

        shutdown.cancel();
        if let Err(e) = loop_handle.await {
            tracing::error!(error = %e, "Dispatch loop task failed");
        }

        served
    }
}
