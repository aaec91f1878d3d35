
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use dispatcher::api::client::DispatcherClient;
use dispatcher::api::{router, ApiState, TestResponse};
use dispatcher::error::DispatcherError;
use dispatcher::scheduler::WorkItem;
use test_harness::{test_policy, FakeDevices, RecordingSink, TestQueue};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

async fn serve_dispatcher(tq: &TestQueue, devices: Arc<FakeDevices>) -> String {
    let state = ApiState {
        admission: Arc::new(tq.controller(devices, RecordingSink::new(), test_policy())),
        mailbox: tq.mailbox.clone(),
    };
    serve(router(state, Duration::from_secs(4))).await
}

#[tokio::test]
async fn test_submit_and_queue_status() {
    let tq = TestQueue::new(3).await;
    let base = serve_dispatcher(&tq, FakeDevices::with_free(&[])).await;
    let client = DispatcherClient::new(&base);

    let response = client.submit(WorkItem::new(6, 1)).await.unwrap();
    assert_eq!(response, TestResponse::success("Data received successfully"));

    let status = client.queue_status().await.unwrap();
    assert_eq!(status.max_size, 3);
    assert_eq!(status.occupancy, 1);
    assert_eq!(status.entries.len(), 1);
    assert_eq!(status.entries[0].source_id, 6);
    assert_eq!(status.entries[0].request_id, 1);
}

#[tokio::test]
async fn test_submit_returns_json_rejections() {
    let tq = TestQueue::new(3).await;
    let devices = FakeDevices::with_free(&[2]);
    devices.fail_device(2);
    let base = serve_dispatcher(&tq, devices).await;

    let response = DispatcherClient::new(&base)
        .submit(WorkItem::new(1, 1))
        .await
        .unwrap();
    assert_eq!(response.status, "error");
}

#[tokio::test]
async fn test_submit_reports_status_without_json_body() {
    let app = Router::new().route("/test", post(|| async { StatusCode::REQUEST_TIMEOUT }));
    let base = serve(app).await;

    let err = DispatcherClient::new(&base)
        .submit(WorkItem::new(1, 1))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DispatcherError::UnexpectedStatus { status: 408, .. }),
        "unexpected error: {}",
        err
    );
}
