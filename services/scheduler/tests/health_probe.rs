
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use cattle_scheduler::client::{ClusterApiClient, HttpMetadataClient};
use cattle_scheduler::config::CattleCredentials;
use cattle_scheduler::health::{router, HealthState, METADATA_UNREACHABLE, UPSTREAM_UNREACHABLE};
use harness::{StaticMetadata, StaticProbe};
use reqwest::Url;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn get_healthcheck(state: HealthState) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/healthcheck")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// A local address nothing listens on.
fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn metadata_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2016-07-29/version"))
        .respond_with(ResponseTemplate::new(200).set_body_string("42"))
        .mount(&server)
        .await;
    server
}

fn cluster_client(base: &str) -> ClusterApiClient {
    let credentials = CattleCredentials {
        url: Url::parse(&format!("{base}/v2-beta")).unwrap(),
        access_key: "access".to_string(),
        secret_key: "secret".to_string(),
    };
    ClusterApiClient::new(&credentials, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn healthy_when_both_reachable() {
    let metadata = metadata_server().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(&upstream)
        .await;

    let state = HealthState::new(
        Arc::new(HttpMetadataClient::new(format!("{}/2016-07-29", metadata.uri())).unwrap()),
        Arc::new(cluster_client(&upstream.uri())),
    );

    assert_eq!(get_healthcheck(state).await, (StatusCode::OK, "ok".to_string()));
}

#[tokio::test]
async fn upstream_error_status_still_counts_as_reachable() {
    let metadata = metadata_server().await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;

    let state = HealthState::new(
        Arc::new(HttpMetadataClient::new(format!("{}/2016-07-29", metadata.uri())).unwrap()),
        Arc::new(cluster_client(&upstream.uri())),
    );

    assert_eq!(get_healthcheck(state).await.0, StatusCode::OK);
}

#[tokio::test]
async fn upstream_unreachable_reported_first() {
    let metadata = metadata_server().await;

    let state = HealthState::new(
        Arc::new(HttpMetadataClient::new(format!("{}/2016-07-29", metadata.uri())).unwrap()),
        Arc::new(cluster_client(&dead_address())),
    );

    assert_eq!(
        get_healthcheck(state).await,
        (StatusCode::NOT_FOUND, UPSTREAM_UNREACHABLE.to_string())
    );
}

#[tokio::test]
async fn metadata_unreachable() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let state = HealthState::new(
        Arc::new(HttpMetadataClient::new(format!("{}/2016-07-29", dead_address())).unwrap()),
        Arc::new(cluster_client(&upstream.uri())),
    );

    assert_eq!(
        get_healthcheck(state).await,
        (StatusCode::NOT_FOUND, METADATA_UNREACHABLE.to_string())
    );
}

#[tokio::test]
async fn both_unreachable_reports_upstream() {
    let state = HealthState::new(Arc::new(StaticMetadata(false)), Arc::new(StaticProbe(false)));

    assert_eq!(
        get_healthcheck(state).await,
        (StatusCode::NOT_FOUND, UPSTREAM_UNREACHABLE.to_string())
    );
}

#[tokio::test]
async fn unknown_path_not_served() {
    let state = HealthState::new(Arc::new(StaticMetadata(true)), Arc::new(StaticProbe(true)));

    let response = router(state)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
