pub mod auth;
mod client;
mod errors;
pub mod provider;
pub mod retry;
pub mod types;

pub use auth::{ApiKey, ClientConfig};
pub use client::OpenAiClient;
pub use errors::{ProviderError, ProviderErrorKind};
pub use provider::Provider;
pub use retry::{RetryPolicy, execute_with_retry};
pub use types::{
    ChatChunk, ChatCompletion, ChatRequest, GenerationOptions, ResponseFormat, Stop, Usage,
};
