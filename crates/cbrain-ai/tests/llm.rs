//! Integration tests for `AnthropicClient` using wiremock HTTP mocks.

use cbrain_ai::{AiError, AnthropicClient, LanguageModel};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str, max_retries: u32) -> AnthropicClient {
    AnthropicClient::with_base_url("test-key", 5, max_retries, 0, base_url)
        .expect("client construction should not fail")
}

fn text_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    })
}

#[tokio::test]
async fn complete_sends_headers_and_returns_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "model": "fast-model",
            "max_tokens": 256,
            "messages": [{ "role": "user", "content": "Classify this" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 0);
    let text = client
        .complete("Classify this", "fast-model", 256)
        .await
        .expect("completion should succeed");

    assert_eq!(text, "[]");
}

#[tokio::test]
async fn complete_joins_multiple_text_blocks() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "content": [
            { "type": "text", "text": "Hello " },
            { "type": "tool_use", "id": "t1", "name": "x", "input": {} },
            { "type": "text", "text": "world" }
        ],
        "stop_reason": "end_turn"
    });
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 0);
    let text = client.complete("hi", "m", 16).await.expect("should succeed");
    assert_eq!(text, "Hello world");
}

#[tokio::test]
async fn complete_retries_overloaded_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 2);
    let text = client.complete("hi", "m", 16).await.expect("should recover");
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn complete_does_not_retry_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let err = client.complete("hi", "m", 16).await.expect_err("should fail");

    assert!(matches!(err, AiError::Status { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn complete_without_text_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "content": [], "stop_reason": "end_turn" })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 0);
    let err = client.complete("hi", "m", 16).await.expect_err("should fail");
    assert!(matches!(err, AiError::InvalidResponse { .. }));
}
