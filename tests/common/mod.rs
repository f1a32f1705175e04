//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wazuh_mcp_gateway::cluster::ClusterConfig;
use wazuh_mcp_gateway::config::Config;
use wazuh_mcp_gateway::gateway::{AppState, create_router};

pub const AUTH_PATH: &str = "/security/user/authenticate";

pub fn cluster(name: &str, base_url: &str) -> ClusterConfig {
    ClusterConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        username: "wazuh".to_string(),
        password: "wazuh-secret".to_string(),
        tls_verify: true,
        timeout: Duration::from_secs(5),
    }
}

pub fn config_for(server: &MockServer) -> Config {
    Config {
        clusters: vec![cluster("lab", &server.uri())],
        ..Config::default()
    }
}

/// Unsigned JWT expiring `exp_in` seconds from now
pub fn jwt(exp_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"iat": now, "exp": now + exp_in}).to_string());
    format!("{header}.{payload}.sig")
}

pub fn auth_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"data": {"token": token}, "error": 0}))
}

/// Credential exchange endpoint expected to be hit exactly `times` times
pub async fn mount_auth(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(header_exists("authorization"))
        .respond_with(auth_response(token))
        .expect(times)
        .mount(server)
        .await;
}

pub fn agents(count: usize) -> Value {
    let statuses = ["active", "disconnected", "active", "never_connected", "pending"];
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("{i:03}"),
                "name": format!("agent-{i}"),
                "status": statuses[i % statuses.len()],
            })
        })
        .collect();
    json!({
        "data": {
            "affected_items": items,
            "total_affected_items": count,
            "total_failed_items": 0,
            "failed_items": []
        },
        "message": "All selected agents information was returned",
        "error": 0
    })
}

pub fn state(config: &Config) -> Arc<AppState> {
    Arc::new(AppState::from_config(config, Vec::new()).unwrap())
}

pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, String) {
    let response = create_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, String) {
    send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(state: &Arc<AppState>, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, text) = send(state, request).await;
    (status, serde_json::from_str(&text).unwrap())
}

pub async fn call_tool(state: &Arc<AppState>, name: &str, arguments: Value) -> Value {
    let (status, body) =
        post_json(state, "/tools/call", &json!({"name": name, "arguments": arguments})).await;
    assert_eq!(status, StatusCode::OK, "unexpected status, body: {body}");
    body
}

/// Parse the first text block of a tool result as JSON
pub fn result_json(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}
