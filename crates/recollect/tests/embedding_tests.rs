//! Integration tests for the remote embedding provider
//!
//! Uses wiremock to stand in for an OpenAI-compatible embeddings endpoint.

use std::sync::Arc;
use std::time::Duration;

use recollect::embedding::{EmbeddingProvider, RemoteEmbeddingProvider, TextEmbedder};
use recollect::error::MemoryError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer, api_key: Option<&str>) -> RemoteEmbeddingProvider {
    RemoteEmbeddingProvider::with_endpoint(
        &server.uri(),
        "text-embedding-3-small",
        api_key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn embedding_body(values: &[f32]) -> serde_json::Value {
    json!({
        "object": "list",
        "data": [{ "object": "embedding", "index": 0, "embedding": values }],
        "model": "text-embedding-3-small"
    })
}

#[tokio::test]
async fn test_embed_returns_vector() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[0.1, 0.2, 0.3])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server, Some("test-key"));
    let embedding = provider.embed("hello").await.unwrap();
    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_rate_limit_reported_as_quota() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server, None);
    match provider.embed("hello").await {
        Err(MemoryError::Embedding(msg)) => assert!(msg.contains("quota exceeded")),
        other => panic!("Expected quota error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_quota_message_in_error_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"error": {"message": "You exceeded your current quota"}})),
        )
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server, None);
    match provider.embed("hello").await {
        Err(MemoryError::Embedding(msg)) => assert!(msg.contains("quota exceeded")),
        other => panic!("Expected quota error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_embedding_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server, None);
    match provider.embed("hello").await {
        Err(MemoryError::Embedding(msg)) => {
            assert!(msg.contains("500"));
            assert!(!msg.contains("quota"));
        }
        other => panic!("Expected embedding error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_data_is_embedding_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server, None);
    assert!(matches!(
        provider.embed("hello").await,
        Err(MemoryError::Embedding(_))
    ));
}

#[tokio::test]
async fn test_text_embedder_truncates_before_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({ "input": "abcdefgh" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = Arc::new(provider_for(&mock_server, None));
    let embedder = TextEmbedder::new(provider, 2, 8, Duration::from_secs(5));

    let embedding = embedder.embed("abcdefghijklmnop").await.unwrap();
    assert_eq!(embedding, Some(vec![1.0, 0.0]));
}

#[tokio::test]
async fn test_text_embedder_skips_blank_input_without_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let provider = Arc::new(provider_for(&mock_server, None));
    let embedder = TextEmbedder::new(provider, 2, 8, Duration::from_secs(5));

    assert_eq!(embedder.embed(" \n ").await.unwrap(), None);
}

#[tokio::test]
async fn test_text_embedder_rejects_unexpected_dimension() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[1.0, 0.0, 0.0])))
        .mount(&mock_server)
        .await;

    let provider = Arc::new(provider_for(&mock_server, None));
    let embedder = TextEmbedder::new(provider, 2, 100, Duration::from_secs(5));

    assert!(matches!(
        embedder.embed("hello").await,
        Err(MemoryError::Embedding(_))
    ));
}
