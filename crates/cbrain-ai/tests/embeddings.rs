//! Integration tests for `TeiEmbedder` using wiremock HTTP mocks.

use cbrain_ai::{AiError, EmbeddingProvider, TeiEmbedder};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_embedder(base_url: &str, max_retries: u32) -> TeiEmbedder {
    TeiEmbedder::new(base_url, 5, max_retries, 0).expect("client construction should not fail")
}

#[tokio::test]
async fn embed_posts_inputs_and_returns_vectors_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(body_json(serde_json::json!({ "inputs": ["alpha", "beta"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([[1.0, 0.0], [0.0, 1.0]])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let embedder = test_embedder(&server.uri(), 0);
    let vectors = embedder
        .embed(&["alpha".to_string(), "beta".to_string()])
        .await
        .expect("embed should succeed");

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn embed_rejects_length_mismatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[1.0]])))
        .mount(&server)
        .await;

    let embedder = test_embedder(&server.uri(), 0);
    let err = embedder
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .expect_err("mismatched lengths must fail");

    assert!(matches!(err, AiError::InvalidResponse { .. }));
}

#[tokio::test]
async fn embed_retries_service_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.5]])))
        .mount(&server)
        .await;

    let embedder = test_embedder(&server.uri(), 2);
    let vectors = embedder
        .embed(&["retry me".to_string()])
        .await
        .expect("second attempt should succeed");

    assert_eq!(vectors, vec![vec![0.5]]);
}

#[tokio::test]
async fn embed_surfaces_status_after_retries_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
        .expect(2)
        .mount(&server)
        .await;

    let embedder = test_embedder(&server.uri(), 1);
    let err = embedder
        .embed(&["x".to_string()])
        .await
        .expect_err("should fail");

    assert!(matches!(err, AiError::Status { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn embed_of_nothing_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let embedder = test_embedder(&server.uri(), 0);
    let vectors = embedder.embed(&[]).await.expect("empty input is fine");
    assert!(vectors.is_empty());
}
