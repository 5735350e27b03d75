use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use crate::envconfig::EngineConfig;
use crate::error::{Error, Result};

pub mod types;

use types::{ChatRequest, ChatResponse, GenerateRequest, Message, VersionResponse};

/// Raw body of a streaming engine response.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// The calls the two pipelines make against the inference engine.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// One non-streaming chat turn; returns the reply text.
    async fn complete_sync(&self, prompt: &str) -> Result<String>;

    /// Starts a streaming generation and hands back the undecoded body.
    async fn stream_generate(&self, prompt: &str) -> Result<ByteStream>;

    async fn version(&self) -> Result<String>;
}

pub struct Client {
    config: EngineConfig,
    client: reqwest::Client,
}

impl Client {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl InferenceEngine for Client {
    async fn complete_sync(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.analysis_model,
            messages: vec![Message { role: "user", content: prompt }],
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!("chat failed: {}", status)));
        }

        let reply: ChatResponse = response.json().await?;
        tracing::debug!(
            model = %self.config.analysis_model,
            chars = reply.message.content.len(),
            done = reply.done,
            "chat completion received"
        );

        Ok(reply.message.content)
    }

    async fn stream_generate(&self, prompt: &str) -> Result<ByteStream> {
        let request = GenerateRequest {
            model: &self.config.chat_model,
            prompt,
            stream: true,
        };

        // The request timeout would also cut off a long stream, so only the
        // wait for response headers is bounded here. Silence after that is
        // the relay's idle timeout.
        let send = self.client.post(self.url("/api/generate")).json(&request).send();
        let response = tokio::time::timeout(self.config.request_timeout, send)
            .await
            .map_err(|_| Error::UpstreamUnavailable("timed out waiting for engine".into()))??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!("generate failed: {}", status)));
        }

        tracing::debug!(model = %self.config.chat_model, "generation stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }

    async fn version(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url("/api/version"))
            .timeout(self.config.connect_timeout)
            .send()
            .await?
            .error_for_status()?;

        let resp: VersionResponse = response.json().await?;
        Ok(resp.version)
    }
}
