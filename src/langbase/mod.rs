//! Langbase client and the LLM/embedding seams the core depends on.
//!
//! Resolution and revision code only ever sees [`LlmClient`] and
//! [`Embedder`]; [`LangbaseClient`] is the production implementation.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{LangbaseError, LangbaseResult};

/// Text completion contract: a fully formed prompt in, free text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run the request and return the raw completion text.
    async fn complete(&self, request: PipeRequest) -> LangbaseResult<String>;
}

/// Produces embedding vectors for texts.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text; the output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> LangbaseResult<Vec<Vec<f32>>>;
}

/// Run a completion under a deadline.
///
/// Elapsed time surfaces as [`LangbaseError::Timeout`] so callers can treat
/// it like any other provider failure.
pub async fn complete_with_timeout(
    llm: &dyn LlmClient,
    request: PipeRequest,
    timeout_ms: u64,
) -> LangbaseResult<String> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), llm.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LangbaseError::Timeout { timeout_ms }),
    }
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Try parsing as raw JSON first (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Bind a completion to a structured type.
pub fn parse_structured<T: DeserializeOwned>(completion: &str) -> LangbaseResult<T> {
    let json = extract_json_from_completion(completion)
        .map_err(|message| LangbaseError::InvalidResponse { message })?;
    serde_json::from_str(json).map_err(|e| LangbaseError::InvalidResponse {
        message: format!("Failed to bind structured response: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pick {
        selected: Option<usize>,
    }

    #[test]
    fn test_extract_json_raw_object() {
        let result = extract_json_from_completion(r#"{"key": "value"}"#);
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_from_json_code_block() {
        let input = "Here is the response:\n```json\n{\"result\": true}\n```\nDone.";
        assert_eq!(extract_json_from_completion(input).unwrap(), r#"{"result": true}"#);
    }

    #[test]
    fn test_extract_json_from_plain_code_block() {
        let input = "Response:\n```\n{\"data\": 123}\n```";
        assert_eq!(extract_json_from_completion(input).unwrap(), r#"{"data": 123}"#);
    }

    #[test]
    fn test_extract_json_empty_block() {
        let result = extract_json_from_completion("```json\n\n```");
        assert!(result.unwrap_err().contains("empty or malformed"));
    }

    #[test]
    fn test_extract_json_no_json_found() {
        let result = extract_json_from_completion("plain text");
        assert!(result.unwrap_err().contains("No JSON found"));
    }

    #[test]
    fn test_parse_structured_binds_fenced_json() {
        let pick: Pick = parse_structured("```json\n{\"selected\": 2}\n```").unwrap();
        assert_eq!(pick, Pick { selected: Some(2) });
    }

    #[test]
    fn test_parse_structured_rejects_prose() {
        let result = parse_structured::<Pick>("I think the second one");
        assert!(matches!(result, Err(LangbaseError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_complete_with_timeout_passes_through() {
        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .times(1)
            .returning(|_| Ok("yes".to_string()));

        let out = complete_with_timeout(&llm, PipeRequest::new("p", vec![]), 1000)
            .await
            .unwrap();
        assert_eq!(out, "yes");
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _request: PipeRequest) -> LangbaseResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_complete_with_timeout_maps_elapsed_to_timeout() {
        let result = complete_with_timeout(&SlowLlm, PipeRequest::new("p", vec![]), 50).await;
        assert!(matches!(result, Err(LangbaseError::Timeout { timeout_ms: 50 })));
    }
}
