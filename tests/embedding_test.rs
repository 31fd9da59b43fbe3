//! Integration tests for the remote embedding backend
//!
//! Tests batching, index ordering and retry using wiremock.

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

use rewrite_clarify_eval::config::{
    EmbeddingBackend, EmbeddingConfig, Provider, ProviderConfig, RequestConfig,
};
use rewrite_clarify_eval::error::EmbeddingError;
use rewrite_clarify_eval::scoring::{cosine_similarity, Embedder, RemoteEmbedder};

/// Embeds each input as `[len, 0]`, returned in reverse index order
struct LengthEmbeddings;

impl Respond for LengthEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let inputs = body["input"].as_array().cloned().unwrap_or_default();

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| {
                let len = text.as_str().map(str::len).unwrap_or(0) as f64;
                json!({ "object": "embedding", "index": index, "embedding": [len, 0.0] })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({ "object": "list", "data": data }))
    }
}

fn create_embedder(base_url: &str, batch_size: usize, attempts: u32) -> RemoteEmbedder {
    let embedding = EmbeddingConfig {
        backend: EmbeddingBackend::Remote,
        model: "text-embedding-3-small".to_string(),
        base_url: base_url.to_string(),
        dimensions: 384,
        batch_size,
    };
    let provider = ProviderConfig {
        provider: Provider::OpenAi,
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };
    let request = RequestConfig {
        timeout_ms: 5000,
        max_attempts: attempts,
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
    };

    RemoteEmbedder::new(&embedding, &provider, &request).expect("Failed to create embedder")
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_batches_and_restores_input_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(LengthEmbeddings)
        .expect(2)
        .mount(&mock_server)
        .await;

    let embedder = create_embedder(&mock_server.uri(), 2, 1);
    let vectors = embedder
        .embed(&texts(&["a", "bbb", "cc"]))
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 3);
    for vector in &vectors {
        assert_eq!(vector, &vec![1.0_f32, 0.0]);
        assert!((cosine_similarity(vector, vector) - 1.0).abs() < 1e-6);
    }
    assert_eq!(embedder.model_id(), "text-embedding-3-small");
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(LengthEmbeddings)
        .expect(1)
        .mount(&mock_server)
        .await;

    let embedder = create_embedder(&mock_server.uri(), 16, 3);
    let vectors = embedder.embed(&texts(&["hello"])).await.unwrap();
    assert_eq!(vectors.len(), 1);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let embedder = create_embedder(&mock_server.uri(), 16, 3);
    let err = embedder.embed(&texts(&["hello"])).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Api { status: 400, .. }));
}
