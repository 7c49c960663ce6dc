//! Integration tests for per-request read routing
//!
//! The authority is played by wiremock; the local store is in memory.

use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use cell_relay::config::UpstreamConfig;
use cell_relay::error::RelayError;
use cell_relay::pointer::{ConfigProvider, InMemoryConfigProvider, UpstreamPointer};
use cell_relay::routing::{RoleRouter, RoutingDecision};
use cell_relay::storage::CellStore;
use cell_relay::upstream::Forwarder;

const PRINCIPAL: &str = "student-1";

fn create_test_router() -> (RoleRouter, Arc<InMemoryConfigProvider>) {
    let pointers = Arc::new(InMemoryConfigProvider::new());
    let forwarder = Forwarder::new(&UpstreamConfig::default()).expect("Failed to create forwarder");
    let router = RoleRouter::new(CellStore::in_memory(), forwarder, pointers.clone());
    (router, pointers)
}

async fn point_at(pointers: &InMemoryConfigProvider, address: &str, credential: Option<&str>) {
    let pointer = UpstreamPointer::new(address, credential.map(str::to_string)).unwrap();
    pointers.set(PRINCIPAL, &pointer).await.unwrap();
}

#[cfg(test)]
mod local_tests {
    use super::*;

    #[tokio::test]
    async fn test_without_pointer_reads_locally() {
        let (router, _) = create_test_router();
        router
            .store()
            .add("AB12CD", "c1", "print(1)", "100")
            .await
            .unwrap();

        assert_eq!(router.decide(PRINCIPAL).await.unwrap(), RoutingDecision::Local);

        let body = router.get_cell(PRINCIPAL, "AB12CD", "c1", "100").await.unwrap();
        assert_eq!(body, json!({ "status": "success", "data": "print(1)" }));

        let body = router.list_cell_ids(PRINCIPAL, Some("AB12CD")).await.unwrap();
        assert_eq!(body, json!({ "status": "success", "data": ["c1"] }));
    }

    #[tokio::test]
    async fn test_local_missing_cell_is_not_found() {
        let (router, _) = create_test_router();
        let err = router
            .get_cell(PRINCIPAL, "AB12CD", "missing", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }
}

#[cfg(test)]
mod remote_tests {
    use super::*;

    #[tokio::test]
    async fn test_pointer_forwards_with_matching_path_and_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/code_stream/AB12CD/get-cell/"))
            .and(query_param("cell_id", "c1"))
            .and(query_param("cell_timestamp", "100"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "data": "from upstream" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let (router, pointers) = create_test_router();
        router
            .store()
            .add("AB12CD", "c1", "local copy", "100")
            .await
            .unwrap();
        point_at(&pointers, &mock_server.uri(), Some("tok")).await;

        let body = router.get_cell(PRINCIPAL, "AB12CD", "c1", "100").await.unwrap();
        assert_eq!(body["data"], "from upstream");
    }

    #[tokio::test]
    async fn test_global_listing_is_forwarded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/code_stream/get-all-cell-ids/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "data": ["a", "b"] })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let (router, pointers) = create_test_router();
        point_at(&pointers, &mock_server.uri(), None).await;

        let body = router.list_cell_ids(PRINCIPAL, None).await.unwrap();
        assert_eq!(body["data"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_upstream_401_is_auth_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let (router, pointers) = create_test_router();
        point_at(&pointers, &mock_server.uri(), Some("wrong")).await;

        let err = router
            .get_cell(PRINCIPAL, "AB12CD", "c1", "100")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamAuthFailed));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_blank_pointer_address_reads_locally() {
        let (router, pointers) = create_test_router();
        let blank = UpstreamPointer {
            upstream_address: String::new(),
            credential: Some("tok".to_string()),
            updated_at: 0,
        };
        pointers.set(PRINCIPAL, &blank).await.unwrap();

        assert_eq!(router.decide(PRINCIPAL).await.unwrap(), RoutingDecision::Local);
    }
}
