use std::time::Duration;

use serde_json::Value;

use crate::client::{GenerationOptions, RetryPolicy};
use crate::tools::image::ImageRef;

/// Options of a single [`crate::Chain::pull`]
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Overrides the chain's model for this call
    pub model: Option<String>,
    pub generation: GenerationOptions,
    /// Example JSON object the response must follow; switches the call to structured output
    pub json_schema: Option<Value>,
    pub retry: RetryPolicy,
}

impl PullOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_query_time(mut self, max_query_time: Duration) -> Self {
        self.retry.max_query_time = Some(max_query_time);
        self
    }
}

/// Shape of the events produced by [`crate::Chain::stream`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamMode {
    /// Every decoded fragment as sent by the backend
    #[default]
    Raw,
    /// Only the text deltas
    PlainText,
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub mode: StreamMode,
    pub model: Option<String>,
    pub generation: GenerationOptions,
    pub retry: RetryPolicy,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plain_text() -> Self {
        Self {
            mode: StreamMode::PlainText,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Options of [`crate::Chain::link_with`]
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Add the turn as the assistant instead of the user
    pub assistant: bool,
    pub images: Vec<ImageRef>,
}

impl LinkOptions {
    pub fn assistant() -> Self {
        Self {
            assistant: true,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<ImageRef>) -> Self {
        self.images.push(image.into());
        self
    }
}
