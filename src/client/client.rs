use bytes::Bytes;
use futures_util::Stream;
use reqwest::StatusCode;
use tracing::{debug, error, info, trace};

use super::auth::{ApiKey, ClientConfig};
use super::provider::Provider;
use super::types::ErrorEnvelope;
use super::{ChatCompletion, ChatRequest, ProviderError};
use crate::chat::ChainError;

static COMPLETIONS_PATH: &str = "chat/completions";

/// Client for any OpenAI-compatible chat-completions endpoint
pub struct OpenAiClient {
    api_key: ApiKey,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ChainError> {
        Ok(Self {
            api_key: config.resolve_key()?,
            base_url: config.base_url.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), COMPLETIONS_PATH)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let url = self.endpoint();
        info!(model = %request.model, stream = request.stream, "Making request");
        trace!(?request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await?;
        debug!(status = %response.status(), "Response received");

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = error_for_status(status, &body);
            error!(%status, %error, "Request failed");
            return Err(error);
        }

        Ok(response)
    }
}

impl Provider for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let response = self.send(&request).await?;
        let completion = response.json::<ChatCompletion>().await?;
        trace!(?completion);
        Ok(completion)
    }

    async fn request(
        &self,
        request: ChatRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Send, ProviderError> {
        let request = if request.stream {
            request
        } else {
            request.streaming()
        };

        let response = self.send(&request).await?;
        debug!("Opening stream");
        Ok(response.bytes_stream())
    }
}

/// Map a failed HTTP response onto a provider error, keeping the backend's message when present
fn error_for_status(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| format!("request failed with status {status}"));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::timeout(message)
        }
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::invalid_request(message)
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            ProviderError::unavailable(message)
        }
        _ => ProviderError::transport(message),
    }
}
