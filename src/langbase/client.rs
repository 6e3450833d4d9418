use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    CreatePipeRequest, CreatePipeResponse, EmbedRequest, PipeDefinition, PipeRequest, PipeResponse,
};
use super::{Embedder, LlmClient};
use crate::config::{LangbaseConfig, PipeConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            request_config,
        })
    }

    /// Call a Langbase pipe with the given request
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();
        self.with_retries(&pipe_name, || self.post_json(&url, &request))
            .await
    }

    /// Embed a batch of texts, one vector per input
    pub async fn embed(&self, chunks: &[String]) -> LangbaseResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embed", self.base_url);
        let request = EmbedRequest {
            chunks: chunks.to_vec(),
            embedding_model: self.embedding_model.clone(),
        };
        let vectors: Vec<Vec<f32>> = self
            .with_retries("embed", || self.post_json(&url, &request))
            .await?;

        if vectors.len() != chunks.len() {
            return Err(LangbaseError::InvalidResponse {
                message: format!(
                    "Expected {} embeddings, received {}",
                    chunks.len(),
                    vectors.len()
                ),
            });
        }
        Ok(vectors)
    }

    /// Run `op` with exponential backoff between failed attempts.
    async fn with_retries<T, F, Fut>(&self, operation: &str, op: F) -> LangbaseResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = LangbaseResult<T>>,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match op().await {
                Ok(response) => {
                    info!(
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        operation = %operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Langbase call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single authenticated POST and decode the JSON body
    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> LangbaseResult<R> {
        debug!(url = %url, "Calling Langbase");

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let pipe_response: CreatePipeResponse = self.post_json(&url, &request).await?;

        info!(
            pipe = %pipe_response.name,
            url = %pipe_response.url,
            "Pipe created successfully"
        );

        Ok(pipe_response)
    }

    /// Upsert every pipe used by resolution and revision. A 409 means the
    /// pipe is already there.
    pub async fn ensure_pipes(&self, pipes: &PipeConfig) -> LangbaseResult<()> {
        for definition in PipeDefinition::all(pipes) {
            match self.create_pipe(CreatePipeRequest::from(&definition)).await {
                Ok(_) => info!(pipe = %definition.name, "Pipe ready"),
                Err(LangbaseError::Api { status: 409, .. }) => {
                    info!(pipe = %definition.name, "Pipe already exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LlmClient for LangbaseClient {
    async fn complete(&self, request: PipeRequest) -> LangbaseResult<String> {
        Ok(self.call_pipe(request).await?.completion)
    }
}

#[async_trait]
impl Embedder for LangbaseClient {
    async fn embed(&self, texts: &[String]) -> LangbaseResult<Vec<Vec<f32>>> {
        LangbaseClient::embed(self, texts).await
    }
}
