mod common;

use std::time::Duration;

use arrsync::{AvailabilityMonitor, CancellationToken, Operation, OverseerClient};
use axum::http::StatusCode;
use common::{fast_options, spawn_server, MockResponse};

#[tokio::test]
async fn monitor_marks_upstream_unavailable_and_stops_on_cancel() {
    let server = spawn_server(vec![MockResponse::status(StatusCode::SERVICE_UNAVAILABLE)]).await;
    let client = OverseerClient::new(&server.base_url, None)
        .and_then(|client| client.with_options(fast_options(0)))
        .expect("client must build");
    let cancel = CancellationToken::new();

    let handle = AvailabilityMonitor::for_client(&client).spawn(cancel.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.is_available() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first failed check must clear availability");

    // The second check is at least two intervals away after a failure.
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("monitor must stop promptly")
        .expect("monitor task must not panic");

    assert_eq!(server.hits(), 1);
    assert!(!client.is_available());
    assert_eq!(client.stats().snapshot(Operation::Health).error, 1);
}

#[tokio::test]
async fn monitor_restores_availability() {
    let server = spawn_server(vec![MockResponse::status(StatusCode::OK)]).await;
    let client = OverseerClient::new(&server.base_url, None)
        .and_then(|client| client.with_options(fast_options(0)))
        .expect("client must build");
    client.availability().set(false);
    let cancel = CancellationToken::new();

    let handle = AvailabilityMonitor::for_client(&client).spawn(cancel.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while !client.is_available() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("healthy check must restore availability");

    cancel.cancel();
    handle.await.expect("monitor task must not panic");
}
