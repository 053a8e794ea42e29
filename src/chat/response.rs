use std::fmt::Display;

use serde_json::Value;
use tracing::{debug, error};

use super::ChainError;
use crate::client::{ChatCompletion, ProviderError};

/// A model response as stored in the chain
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Text(String),
    Json(Value),
}

impl Response {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Json(value) => Some(value),
        }
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Json(value) => write!(f, "{}", value),
        }
    }
}

impl From<String> for Response {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Response {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for Response {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Text of the first choice; a choice without content reads as empty text.
pub fn completion_text(completion: &ChatCompletion) -> Result<&str, ChainError> {
    let choice = completion.choices.first().ok_or_else(|| {
        error!("Completion without choices");
        ProviderError::transport("completion has no choices")
    })?;

    Ok(choice.message.content.as_deref().unwrap_or_default())
}

/// Turn a completion into a [`Response`], parsing the JSON object out of it when `structured`.
pub fn normalize(completion: &ChatCompletion, structured: bool) -> Result<Response, ChainError> {
    let text = completion_text(completion)?;

    if structured {
        extract_json(text).map(Response::Json)
    } else {
        Ok(Response::Text(text.to_string()))
    }
}

/// Parse the span between the first `{` and the last `}` of `text`.
pub fn extract_json(text: &str) -> Result<Value, ChainError> {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            debug!(%text, "No JSON object in response");
            return Err(ChainError::StructuredParse(
                "no JSON object found".to_string(),
            ));
        }
    };

    serde_json::from_str(span).map_err(|e| {
        debug!(%span, %e, "Cannot parse JSON object");
        ChainError::StructuredParse(e.to_string())
    })
}
