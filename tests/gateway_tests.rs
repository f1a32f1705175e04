//! HTTP front end: discovery, invocation, chat completions and SSE

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use reqwest::Method;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wazuh_mcp_gateway::config::Config;
use wazuh_mcp_gateway::gateway::{AppState, Gateway, create_router};
use wazuh_mcp_gateway::tool::{Content, ToolContext, ToolDefinition, ToolHandler, ToolMetadata};
use wazuh_mcp_gateway::{Error, Result};

use common::{agents, call_tool, config_for, get, jwt, mount_auth, post_json, result_json, state};

struct Restart;

#[async_trait]
impl ToolHandler for Restart {
    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<Vec<Content>> {
        Ok(vec![Content::text("restarted")])
    }
}

fn restart_tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: "Restart an agent".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {"cluster": {"type": "string"}},
            "required": ["cluster"]
        }),
        metadata: ToolMetadata {
            category: "agents".to_string(),
            http_method: Some(Method::PUT),
        },
        handler: Arc::new(Restart),
    }
}

fn tool_names(body: &str) -> Vec<String> {
    let value: Value = serde_json::from_str(body).unwrap();
    value["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

fn offline_config() -> Config {
    Config {
        clusters: vec![common::cluster("lab", "http://127.0.0.1:9")],
        ..Config::default()
    }
}

// ── Startup ──

#[test]
fn duplicate_tool_fails_startup() {
    let err = Gateway::with_tools(offline_config(), vec![restart_tool("GetAgentsTool")])
        .err()
        .unwrap();
    assert!(matches!(err, Error::DuplicateTool(name) if name == "GetAgentsTool"));
}

#[test]
fn invalid_filter_regex_fails_startup() {
    let mut config = offline_config();
    config.filter.disabled_regex = vec!["(".into()];
    assert!(matches!(Gateway::new(config), Err(Error::Config(_))));
}

#[test]
fn duplicate_cluster_fails_startup() {
    let mut config = offline_config();
    config.clusters.push(common::cluster("lab", "http://127.0.0.1:10"));
    assert!(Gateway::new(config).is_err());
}

// ── Discovery ──

#[tokio::test]
async fn health_never_touches_upstream() {
    let state = state(&offline_config());
    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));
}

#[tokio::test]
async fn tools_lists_full_catalogue_by_default() {
    let state = state(&offline_config());
    let (status, body) = get(&state, "/tools").await;
    assert_eq!(status, StatusCode::OK);

    let names = tool_names(&body);
    assert_eq!(names.len(), 10);
    assert_eq!(names[0], "AuthenticateTool");

    let value: Value = serde_json::from_str(&body).unwrap();
    let ports = &value["tools"][3];
    assert_eq!(ports["name"], json!("GetAgentPortsTool"));
    assert_eq!(ports["httpMethod"], json!("GET"));
    assert_eq!(ports["category"], json!("syscollector"));
    assert!(ports["inputSchema"]["properties"]["local_ip"].is_object());
}

#[tokio::test]
async fn denied_tools_are_never_listed() {
    let mut config = offline_config();
    config.filter.disabled_tools = vec!["getagentportstool".into()];
    config.filter.disabled_categories = vec!["SCA".into()];
    config.filter.disabled_regex = vec!["^ListRules".into()];
    let state = state(&config);

    let names = tool_names(&get(&state, "/tools").await.1);
    for denied in ["GetAgentPortsTool", "GetAgentScaTool", "GetScaPolicyChecksTool", "ListRulesTool"] {
        assert!(!names.iter().any(|n| n == denied), "{denied} listed");
    }
    assert!(names.iter().any(|n| n == "GetAgentsTool"));
}

// ── Invocation ──

#[tokio::test]
async fn filtered_and_missing_tools_are_distinguished() {
    let mut config = offline_config();
    config.filter.disabled_tools = vec!["GetAgentPortsTool".into()];
    let state = state(&config);

    let denied = call_tool(&state, "GetAgentPortsTool", json!({"cluster": "lab", "agent_id": "001"})).await;
    assert_eq!(denied["success"], json!(false));
    assert_eq!(denied["error"]["kind"], json!("filter_denied"));

    let missing = call_tool(&state, "NoSuchTool", json!({})).await;
    assert_eq!(missing["success"], json!(false));
    assert_eq!(missing["error"]["kind"], json!("tool_not_found"));
}

#[tokio::test]
async fn read_only_hides_and_denies_mutating_tools() {
    let mut config = offline_config();
    config.filter.read_only = true;
    let state = Arc::new(AppState::from_config(&config, vec![restart_tool("RestartAgentTool")]).unwrap());

    let names = tool_names(&get(&state, "/tools").await.1);
    assert!(!names.iter().any(|n| n == "RestartAgentTool"));
    assert!(names.iter().any(|n| n == "AuthenticateTool"));

    let result = call_tool(&state, "RestartAgentTool", json!({"cluster": "lab"})).await;
    assert_eq!(result["error"]["kind"], json!("filter_denied"));
}

#[tokio::test]
async fn mutating_tool_allowed_without_read_only() {
    let state = Arc::new(
        AppState::from_config(&offline_config(), vec![restart_tool("RestartAgentTool")]).unwrap(),
    );
    let result = call_tool(&state, "RestartAgentTool", json!({"cluster": "lab"})).await;
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["content"][0]["text"], json!("restarted"));
}

#[tokio::test]
async fn validation_failures_name_the_problem() {
    let state = state(&offline_config());

    let missing = call_tool(&state, "GetAgentTool", json!({"cluster": "lab"})).await;
    assert_eq!(missing["error"]["kind"], json!("validation"));
    assert!(missing["error"]["message"].as_str().unwrap().contains("agent_id"));

    let unknown = call_tool(&state, "GetAgentsTool", json!({"cluster": "prod"})).await;
    assert_eq!(unknown["error"]["kind"], json!("validation"));
    assert!(unknown["error"]["message"].as_str().unwrap().contains("lab"));

    let bad_enum = call_tool(&state, "GetAgentsTool", json!({"cluster": "lab", "status": ["sleeping"]})).await;
    assert_eq!(bad_enum["error"]["kind"], json!("validation"));
}

#[tokio::test]
async fn get_agents_end_to_end() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 1).await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .and(query_param("status", "active"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agents(45)))
        .expect(1)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let result = call_tool(
        &state,
        "GetAgentsTool",
        json!({"cluster": "lab", "status": ["active"], "limit": 10}),
    )
    .await;

    assert_eq!(result["success"], json!(true));
    let body = result_json(&result);
    let items = body["data"]["affected_items"].as_array().unwrap();
    assert!(!items.is_empty());
    assert!(items.len() <= 10);
    assert!(items.iter().all(|a| a["status"] == "active"));
    // 18 of the 45 fixture agents are active.
    assert_eq!(body["data"]["total_affected_items"], json!(18));
}

#[tokio::test]
async fn string_arguments_are_coerced() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 1).await;
    Mock::given(method("GET"))
        .and(path("/syscollector/001/ports"))
        .and(query_param("limit", "5"))
        .and(query_param("local.ip", "10.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"affected_items": []}})))
        .expect(1)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let result = call_tool(
        &state,
        "GetAgentPortsTool",
        json!({"cluster": "lab", "agent_id": "001", "limit": "5", "local_ip": "10.0.0.1"}),
    )
    .await;
    assert_eq!(result["success"], json!(true));
}

#[tokio::test]
async fn retry_after_401_succeeds() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 2).await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agents(3)))
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let result = call_tool(&state, "GetAgentsTool", json!({"cluster": "lab"})).await;
    assert_eq!(result["success"], json!(true));
}

#[tokio::test]
async fn repeated_401_is_upstream_failure() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 2).await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid token"))
        .expect(2)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let result = call_tool(&state, "GetAgentsTool", json!({"cluster": "lab"})).await;
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["error"]["kind"], json!("upstream"));
    assert_eq!(result["error"]["status_code"], json!(401));
}

#[tokio::test]
async fn raw_rule_file_returned_as_text() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 1).await;
    Mock::given(method("GET"))
        .and(path("/rules/files/0010-rules_config.xml"))
        .and(query_param("raw", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<group name=\"syslog,\"></group>"))
        .expect(1)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let result = call_tool(
        &state,
        "GetRuleFileContentTool",
        json!({"cluster": "lab", "filename": "0010-rules_config.xml", "raw": true}),
    )
    .await;

    let body = result_json(&result);
    assert_eq!(body["raw"], json!(true));
    assert_eq!(body["filename"], json!("0010-rules_config.xml"));
    assert!(body["content"].as_str().unwrap().starts_with("<group"));
}

#[tokio::test]
async fn authenticate_tool_forces_exchange() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 2).await;

    let state = state(&config_for(&server));
    for _ in 0..2 {
        let result = call_tool(&state, "AuthenticateTool", json!({"cluster": "lab"})).await;
        assert_eq!(result["success"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("New token acquired"));
    }
}

#[tokio::test]
async fn malformed_call_body_is_bad_request() {
    let state = state(&offline_config());
    let (status, body) = post_json(&state, "/tools/call", &json!({"arguments": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], json!("invalid_request_error"));
}

// ── Chat completions ──

#[tokio::test]
async fn list_tools_system_message() {
    let mut config = offline_config();
    config.filter.disabled_categories = vec!["rules".into()];
    let state = state(&config);

    let (status, body) = post_json(
        &state,
        "/messages",
        &json!({"messages": [{"role": "system", "content": "list_tools"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], json!("chat.completion"));
    assert_eq!(body["model"], json!("wazuh-mcp-server"));
    let listed: Vec<Value> =
        serde_json::from_str(body["choices"][0]["message"]["content"].as_str().unwrap()).unwrap();
    assert_eq!(listed.len(), 8);
    assert!(listed.iter().all(|t| t["category"] != "rules"));
}

#[tokio::test]
async fn tool_call_message_invokes_tool() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 1).await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .and(query_param("agents_list", "001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agents(1)))
        .expect(1)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let (status, body) = post_json(
        &state,
        "/messages",
        &json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "Show agent 001"},
                {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "GetAgentTool",
                        "arguments": "{\"cluster\": \"lab\", \"agent_id\": \"001\"}"
                    }
                }]}
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], json!("gpt-4o"));
    assert_eq!(body["tool_result"]["success"], json!(true));
    let content: Value =
        serde_json::from_str(body["choices"][0]["message"]["content"].as_str().unwrap()).unwrap();
    assert_eq!(content, body["tool_result"]);
}

#[tokio::test]
async fn call_text_convention_understood() {
    let state = state(&offline_config());
    let (status, body) = post_json(
        &state,
        "/messages",
        &json!({"messages": [{
            "role": "user",
            "content": "Call tool GetAgentTool with arguments: {\"cluster\": \"prod\", \"agent_id\": \"001\"}"
        }]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tool_result"]["error"]["kind"], json!("validation"));
}

#[tokio::test]
async fn ambiguous_chat_is_rejected() {
    let state = state(&offline_config());

    let (status, body) = post_json(
        &state,
        "/messages",
        &json!({"messages": [{"role": "user", "content": "how many agents?"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], json!("invalid_request_error"));

    let call = json!({"type": "function", "function": {"name": "GetAgentsTool", "arguments": "{}"}});
    let (status, _) = post_json(
        &state,
        "/messages",
        &json!({"messages": [{"role": "assistant", "tool_calls": [call.clone(), call]}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn streamed_completion_is_single_chunk() {
    let state = state(&offline_config());
    let request = axum::http::Request::post("/messages")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            json!({
                "stream": true,
                "messages": [{"role": "system", "content": "list_tools"}]
            })
            .to_string(),
        ))
        .unwrap();

    let (status, text) = common::send(&state, request).await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<&str> = text.split("\n\n").filter(|e| e.starts_with("data:")).collect();
    assert_eq!(events.len(), 2);
    assert!(events[0].contains("\"chat.completion.chunk\""));
    assert_eq!(events[1], "data: [DONE]");
}

// ── SSE ──

#[tokio::test]
async fn sse_without_tool_streams_catalogue() {
    let state = state(&offline_config());
    let (status, text) = get(&state, "/sse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text.matches("event: tools").count(), 1);
    assert!(text.contains("AuthenticateTool"));
}

#[tokio::test]
async fn sse_tool_call_streams_one_result() {
    let state = state(&offline_config());
    let (status, text) = get(
        &state,
        "/sse?tool=GetAgentsTool&arguments=%7B%22cluster%22%3A%22prod%22%7D",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text.matches("event: result").count(), 1);
    assert!(text.contains("\"validation\""));
}

#[tokio::test]
async fn sse_rejects_malformed_arguments() {
    let state = state(&offline_config());
    let (status, _) = get(&state, "/sse?tool=GetAgentsTool&arguments=%7Bnope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sse_headers_flush_before_slow_tool_finishes() {
    let server = MockServer::start().await;
    mount_auth(&server, &jwt(900), 1).await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(agents(3))
                .set_delay(Duration::from_millis(600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = state(&config_for(&server));
    let request = Request::get("/sse?tool=GetAgentsTool&arguments=%7B%22cluster%22%3A%22lab%22%7D")
        .body(Body::empty())
        .unwrap();
    let response = tokio::time::timeout(
        Duration::from_millis(300),
        create_router(Arc::clone(&state)).oneshot(request),
    )
    .await
    .expect("response head should not wait for the tool call")
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.matches("event: result").count(), 1);
    assert!(text.contains(r#""success":true"#), "unexpected stream: {text}");
}
