//! Wire types and unary client for `device.DeviceService`.
//!
//! ```proto
//! service DeviceService {
//!   rpc GetDeviceList(google.protobuf.Empty) returns (DeviceListResponse);
//!   rpc SendTest(TestRequest) returns (google.protobuf.Empty);
//! }
//! ```

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

/// Wire-compatible with `google.protobuf.Empty`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeviceInfo {
    #[prost(uint32, tag = "1")]
    pub device_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceListResponse {
    #[prost(message, repeated, tag = "1")]
    pub devices: Vec<DeviceInfo>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TestRequest {
    #[prost(uint32, tag = "1")]
    pub device_id: u32,
    #[prost(uint32, tag = "2")]
    pub source_id: u32,
    #[prost(uint32, tag = "3")]
    pub test_number: u32,
}

const GET_DEVICE_LIST: &str = "/device.DeviceService/GetDeviceList";
const SEND_TEST: &str = "/device.DeviceService/SendTest";

#[derive(Debug, Clone)]
pub struct DeviceServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl DeviceServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn get_device_list(
        &mut self,
        request: Request<Empty>,
    ) -> Result<Response<DeviceListResponse>, Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        self.inner
            .unary(request, PathAndQuery::from_static(GET_DEVICE_LIST), codec)
            .await
    }

    pub async fn send_test(
        &mut self,
        request: Request<TestRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        self.inner
            .unary(request, PathAndQuery::from_static(SEND_TEST), codec)
            .await
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("Service was not ready: {}", e)))
    }
}
