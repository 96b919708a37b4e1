use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ordoro_sync::config::{self, Config};
use ordoro_sync::ordoro::{InventorySource, OrdoroClient, PageCursor};
use ordoro_sync::sync::{self, SyncOptions};
use ordoro_sync::SyncError;

fn config_for(uri: &str, overrides: &[(&'static str, &'static str)]) -> Config {
    let mut env: HashMap<&str, &str> = config::example();
    env.insert("ORDORO_BASE_URL", uri);
    env.insert("BACKOFF_BASE", "0");
    env.insert("PAGE_LIMIT", "2");
    for &(k, v) in overrides {
        env.insert(k, v);
    }
    config::from_map(&env).unwrap()
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn token_then_offset_pages() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/product/"))
        .and(query_param("offset", "0"))
        .and(header("Authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "product": [
                {"id": 1, "sku": "A100", "name": "Widget",
                 "warehouses": [{"id": 11, "on_hand": 10, "available": 10}]},
                {"id": 2, "sku": "B200", "name": "Gadget",
                 "warehouses": [{"id": 11, "on_hand": 1, "available": 0}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .and(query_param("offset", "2"))
        .and(header("Authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "product": [{"id": 3, "sku": "C300", "name": "Gizmo", "warehouses": []}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let snapshot = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap();

    let skus: Vec<&str> = snapshot.products.iter().map(|p| p.sku.as_str()).collect();
    assert_eq!(skus, vec!["A100", "B200", "C300"]);
    assert_eq!(snapshot.inventory.len(), 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].method.as_str(), "POST");
    assert_eq!(requests[0].url.path(), "/oauth/token");
    let form = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(form.contains("grant_type=client_credentials"));
    assert!(form.contains("client_id=ordoro-client"));
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn rejected_token_fails_before_any_data_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let err = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Auth { service: "ordoro", .. }));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "product": [{"id": 1, "sku": "A100"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[("MAX_RETRIES", "3")]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    client.authenticate().await.unwrap();
    let body = client
        .fetch_page("product/", PageCursor::Offset(0), 2)
        .await
        .unwrap();
    assert_eq!(body["product"][0]["sku"], "A100");
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[("MAX_RETRIES", "2")]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let err = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap_err();
    match err {
        SyncError::RetriesExhausted { attempts, ref last, .. } => {
            assert_eq!(attempts, 3);
            assert!(last.contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    client.authenticate().await.unwrap();
    let err = client
        .fetch_page("product/", PageCursor::Offset(0), 2)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn basic_mode_skips_token_exchange() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "sku": "A100"}])))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[("ORDORO_AUTH_MODE", "basic")]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let snapshot = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap();
    assert_eq!(snapshot.products.len(), 1);

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    assert!(auth.to_str().unwrap().starts_with("Basic "));
}

#[tokio::test]
async fn page_mode_fallback_over_http() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    // This server ignores `offset`: every offset request gets page one.
    Mock::given(method("GET"))
        .and(path("/product/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "product": [{"id": 3, "sku": "C300"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "product": [{"id": 1, "sku": "A100"}, {"id": 2, "sku": "B200"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cfg = config_for(&server.uri(), &[]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let snapshot = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap();
    let skus: Vec<&str> = snapshot.products.iter().map(|p| p.sku.as_str()).collect();
    assert_eq!(skus, vec!["A100", "B200", "C300"]);
}

#[tokio::test]
async fn redirect_to_another_port_keeps_credentials() {
    let server = MockServer::start().await;
    let mirror = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/product/"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("Location", format!("{}/product/?limit=2&offset=0", mirror.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/"))
        .and(header("Authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "product": [{"id": 1, "sku": "A100"}]
        })))
        .expect(1)
        .mount(&mirror)
        .await;

    let cfg = config_for(&server.uri(), &[]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    client.authenticate().await.unwrap();
    let body = client
        .fetch_page("product/", PageCursor::Offset(0), 2)
        .await
        .unwrap();
    assert_eq!(body["product"][0]["sku"], "A100");
}

#[tokio::test]
async fn connection_failures_are_retried_then_reported() {
    // Bind and release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let uri = format!("http://127.0.0.1:{port}");

    let cfg = config_for(&uri, &[("ORDORO_AUTH_MODE", "basic"), ("MAX_RETRIES", "2")]);
    let client = OrdoroClient::new(&cfg.ordoro).unwrap();
    let err = sync::fetch_snapshot(&client, &SyncOptions::from_config(&cfg.ordoro))
        .await
        .unwrap_err();
    match err {
        SyncError::RetriesExhausted { attempts, ref last, .. } => {
            assert_eq!(attempts, 3);
            assert!(!last.starts_with("status "), "{last}");
        }
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 4);
}
