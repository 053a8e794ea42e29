use std::fmt;

use tracing::{debug, error};

use crate::chat::ChainError;

pub const DEFAULT_ENVIRON_KEY: &str = "OPENAI_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// An API key that never shows up in logs or `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Connection settings for the OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<ApiKey>,
    /// Environment variable read when no explicit key is given
    pub environ_key: String,
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            environ_key: DEFAULT_ENVIRON_KEY.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_environ_key(mut self, environ_key: impl Into<String>) -> Self {
        self.environ_key = environ_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The explicit key if any, otherwise the one in the configured environment variable.
    /// An explicit key that is blank is rejected rather than replaced by the environment.
    pub fn resolve_key(&self) -> Result<ApiKey, ChainError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ApiKey, ChainError> {
        if let Some(key) = &self.api_key {
            if key.expose().trim().is_empty() {
                error!("Explicit API key is empty");
                return Err(ChainError::Config("the given API key is empty".to_string()));
            }
            debug!("Using explicit API key");
            return Ok(key.clone());
        }

        debug!(environ_key = %self.environ_key, "Looking for API key in environment");
        match lookup(&self.environ_key).filter(|key| !key.trim().is_empty()) {
            Some(key) => Ok(ApiKey::new(key.trim())),
            None => {
                error!(environ_key = %self.environ_key, "API key not found");
                Err(ChainError::Config(format!(
                    "no API key given and ${} is not set",
                    self.environ_key
                )))
            }
        }
    }
}
