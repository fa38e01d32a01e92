//! Mapping of HTTP failures to RemoteError

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reliefsync_api::{ApiClient, HttpRemoteDataSource};
use reliefsync_core::ports::{IRemoteDataSource, RecordShape, RemoteError};

use crate::common::{self, incident};

async fn mount_status(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_unauthorized_is_expired_token() {
    let (server, remote) = common::setup_api_mock().await;
    mount_status(&server, 401, "").await;

    let err = remote.count_worksites(incident(), None).await.unwrap_err();
    assert_eq!(err, RemoteError::ExpiredToken);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unavailable_is_transient_server_error() {
    let (server, remote) = common::setup_api_mock().await;
    mount_status(&server, 503, "maintenance").await;

    let err = remote.count_worksites(incident(), None).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Server {
            status: 503,
            message: "maintenance".to_string()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_not_found_is_permanent() {
    let (server, remote) = common::setup_api_mock().await;
    mount_status(&server, 404, "no such incident").await;

    let err = remote.count_worksites(incident(), None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "id": "x" }] })))
        .mount(&server)
        .await;

    let err = remote
        .fetch_worksites_page(incident(), RecordShape::Short, 40, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let remote = HttpRemoteDataSource::new(uri, None);
    let err = remote.count_worksites(incident(), None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let (server, remote) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 12 })))
        .expect(1)
        .mount(&server)
        .await;

    let count = remote
        .count_worksites(incident(), None)
        .await
        .expect("count failed after retry");
    assert_eq!(count, 12);
}

#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/worksites/count"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let remote =
        HttpRemoteDataSource::from_client(ApiClient::new(server.uri(), None).with_max_retries(1));
    let err = remote.count_worksites(incident(), None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 429, .. }));
    assert!(err.is_transient());
}
