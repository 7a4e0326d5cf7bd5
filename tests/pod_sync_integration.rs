//! End-to-end exercise of a pod worker against a mock admin port and of the
//! aggregation pipeline driving a repository read-out, in the
//! `#[test_log::test(tokio::test)]` style used by the teacher's admin
//! integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use rlcp::codec::{decode_zone, encode_zone};
use rlcp::metrics::Metrics;
use rlcp::model::{KeyKind, RateLimitEntry, RateLimitHeader, Zone};
use rlcp::pod_client::{PodClient, PodClientConfig};
use rlcp::pod_worker;
use rlcp::registry::Registry;

async fn mock_zone_handler(
    Path(zone): Path<String>,
    Query(_params): Query<std::collections::HashMap<String, String>>,
) -> Vec<u8> {
    let zone = Zone {
        name: zone,
        header: RateLimitHeader {
            key_kind: KeyKind::RemoteAddress,
            now_ms: 1000,
            now_monotonic_ms: 500,
        },
        entries: vec![RateLimitEntry {
            key: b"1.2.3.4".to_vec(),
            last: 480,
            excess: 3,
        }],
    };
    encode_zone(&zone).unwrap()
}

async fn spawn_mock_pod() -> SocketAddr {
    let app = Router::new().route("/rate-limit/:zone", get(mock_zone_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[test_log::test(tokio::test)]
async fn pod_client_fetches_and_decodes_from_real_http_server() {
    let addr = spawn_mock_pod().await;
    let client = PodClient::new(&addr.to_string(), &PodClientConfig::default()).unwrap();

    let zone = client.fetch("limit_req_zone", None).await.unwrap();
    assert_eq!(zone.entries.len(), 1);
    assert_eq!(zone.entries[0].key, b"1.2.3.4");
    // 1000 - (500 - 480) = 980
    assert_eq!(zone.entries[0].last, 980);
}

#[test_log::test(tokio::test)]
async fn pod_worker_read_round_trips_through_spawned_task() {
    let addr = spawn_mock_pod().await;
    let client = PodClient::new(&addr.to_string(), &PodClientConfig::default()).unwrap();
    let metrics = Arc::new(Metrics::new());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = pod_worker::spawn(
        "pod-a".to_string(),
        "inst-a".to_string(),
        client,
        metrics,
        Duration::from_millis(200),
        shutdown_rx,
    );

    let zone = handle.read("limit_req_zone").await.unwrap();
    assert_eq!(zone.entries[0].excess, 3);
}

#[test_log::test(tokio::test)]
async fn registry_tracks_spawned_pod_workers_across_tasks() {
    let addr = spawn_mock_pod().await;
    let metrics = Arc::new(Metrics::new());
    let registry: Registry<pod_worker::PodWorkerHandle> = Registry::new();

    for i in 0..3 {
        let client = PodClient::new(&addr.to_string(), &PodClientConfig::default()).unwrap();
        let handle = pod_worker::spawn(
            format!("pod-{i}"),
            "inst-a".to_string(),
            client,
            Arc::clone(&metrics),
            Duration::from_millis(200),
            registry.shutdown_receiver(),
        );
        registry.insert(Arc::new(handle));
    }

    assert_eq!(registry.count(), 3);
    registry.broadcast_shutdown();
    // Give the spawned tasks a moment to observe the shutdown signal.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[test_log::test(tokio::test)]
async fn decode_then_encode_preserves_zone_shape() {
    let addr = spawn_mock_pod().await;
    let resp = reqwest::get(format!("http://{addr}/rate-limit/z1"))
        .await
        .unwrap();
    let body = resp.bytes().await.unwrap();
    let zone = decode_zone("z1", &body).unwrap();
    let reencoded = encode_zone(&zone).unwrap();
    let redecoded = decode_zone("z1", &reencoded).unwrap();
    assert_eq!(zone.entries, redecoded.entries);
}
