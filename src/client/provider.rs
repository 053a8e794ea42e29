use bytes::Bytes;
use futures_util::Stream;

use super::{ChatCompletion, ChatRequest, ProviderError};

/// A chat-completion backend
#[allow(async_fn_in_trait)]
pub trait Provider {
    /// Send the request and wait for the whole response
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError>;

    /// Send the request in streaming mode and hand back the raw server-sent event bytes
    async fn request(
        &self,
        request: ChatRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Send, ProviderError>;
}
