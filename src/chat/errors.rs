use thiserror::Error;

use crate::client::ProviderError;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid chain usage: {0}")]
    Usage(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(
        "Response was not in the expected JSON format ({0}). Check that you haven't accidentally \
         lowered the max_tokens parameter so that the response is truncated."
    )]
    StructuredParse(String),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Coarse classification of a [`ChainError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    InvalidArgument,
    Config,
    StructuredParse,
    Provider,
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage(_) => ErrorKind::Usage,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Config(_) => ErrorKind::Config,
            Self::StructuredParse(_) => ErrorKind::StructuredParse,
            Self::Provider(_) => ErrorKind::Provider,
        }
    }

    /// The backend error behind this failure, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_parse_points_at_truncation() {
        let error = ChainError::StructuredParse("EOF while parsing an object".to_string());
        let message = error.to_string();

        assert!(message.starts_with("Response was not in the expected JSON format"));
        assert!(message.contains("max_tokens"));
        assert_eq!(error.kind(), ErrorKind::StructuredParse);
    }

    #[test]
    fn provider_errors_convert() {
        let error: ChainError = ProviderError::timeout("slow").into();

        assert_eq!(error.kind(), ErrorKind::Provider);
        assert!(error.provider_error().is_some_and(|e| e.retryable));
    }
}
