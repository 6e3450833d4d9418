//! Integration tests for the Langbase client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use dice::config::{LangbaseConfig, PipeConfig, RequestConfig};
use dice::error::LangbaseError;
use dice::langbase::{complete_with_timeout, Embedder, LangbaseClient, LlmClient, Message, PipeRequest};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str) -> LangbaseClient {
    create_client_with(base_url, 5000, 0)
}

fn create_client_with(base_url: &str, timeout_ms: u64, max_retries: u32) -> LangbaseClient {
    let config = LangbaseConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        embedding_model: "openai:text-embedding-3-small".to_string(),
    };
    let request_config = RequestConfig {
        timeout_ms,
        max_retries,
        retry_delay_ms: 10,
    };
    LangbaseClient::new(&config, request_config).expect("Failed to create client")
}

fn create_test_request(content: &str) -> PipeRequest {
    PipeRequest::new("dice-extraction-v1", vec![Message::user(content)])
}

mod pipe_call_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_pipe_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({"name": "dice-extraction-v1", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "completion": "{\"entities\": []}",
                "threadId": "thread-123",
                "raw": {
                    "model": "gpt-4o-mini",
                    "usage": {
                        "prompt_tokens": 100,
                        "completion_tokens": 50,
                        "total_tokens": 150
                    }
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let response = client
            .call_pipe(create_test_request("Holmes met Watson."))
            .await
            .expect("pipe call should succeed");

        assert!(response.success);
        assert_eq!(response.completion, "{\"entities\": []}");
        assert_eq!(response.thread_id, Some("thread-123".to_string()));
    }

    #[tokio::test]
    async fn test_complete_returns_completion_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "completion": "2 - the elder brother"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let completion = client.complete(create_test_request("pick one")).await.unwrap();
        assert_eq!(completion, "2 - the elder brother");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        for status in [400u16, 401, 429, 500] {
            let mock_server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/pipes/run"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": {"message": "nope"}
                })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let client = create_test_client(&mock_server.uri());
            let err = client.call_pipe(create_test_request("Test")).await.unwrap_err();
            match err {
                LangbaseError::Unavailable { message, retries } => {
                    assert!(message.contains(&status.to_string()));
                    assert_eq!(retries, 1);
                }
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        assert!(client.call_pipe(create_test_request("Test")).await.is_err());
    }
}

mod embed_tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_sends_model_and_chunks() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .and(body_partial_json(json!({
                "chunks": ["Sherlock Holmes", "John Watson"],
                "embeddingModel": "openai:text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                [0.1, 0.2, 0.3],
                [0.4, 0.5, 0.6]
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let vectors = Embedder::embed(
            &client,
            &["Sherlock Holmes".to_string(), "John Watson".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4f32, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_invalid() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.2]])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = client
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LangbaseError::InvalidResponse { .. }));
    }
}

mod pipe_setup_tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_pipes_upserts_every_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .and(body_partial_json(json!({"upsert": true, "json": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "pipe",
                "status": "public",
                "url": "https://langbase.com/pipe"
            })))
            .expect(5)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        client.ensure_pipes(&PipeConfig::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_pipes_tolerates_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .expect(5)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        client.ensure_pipes(&PipeConfig::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_pipes_stops_on_other_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = client
            .ensure_pipes(&PipeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LangbaseError::Api { status: 403, .. }));
    }
}

mod timeout_tests {
    use super::*;

    #[tokio::test]
    async fn test_request_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "success": true,
                        "completion": "Delayed response"
                    }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let client = create_client_with(&mock_server.uri(), 100, 0);
        let result = client.call_pipe(create_test_request("Test")).await;

        assert!(result.is_err(), "Should timeout");
    }

    #[tokio::test]
    async fn test_complete_with_timeout_bounds_slow_calls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "completion": "late"}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        // the client itself would wait much longer
        let client = create_client_with(&mock_server.uri(), 30_000, 0);
        let err = complete_with_timeout(&client, create_test_request("Test"), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, LangbaseError::Timeout { timeout_ms: 100 }));
    }
}

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_retries_until_exhausted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "Server error"}
            })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_client_with(&mock_server.uri(), 5000, 2);
        let err = client.call_pipe(create_test_request("Test")).await.unwrap_err();
        assert!(matches!(err, LangbaseError::Unavailable { retries: 3, .. }));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "completion": "ok"
            })))
            .mount(&mock_server)
            .await;

        let client = create_client_with(&mock_server.uri(), 5000, 1);
        let response = client.call_pipe(create_test_request("Test")).await.unwrap();
        assert_eq!(response.completion, "ok");
    }
}
