//! Fluent builder for chat-completion conversations.
//!
//! A [`Chain`] collects a system prompt and ordered turns, sends them to a model with
//! [`Chain::pull`] or [`Chain::stream`] and threads each response into the next turn.
//! Token usage of every call is tracked on the chain.
//!
//! ```rust,no_run
//! use flowchat::{Chain, ClientConfig, PullOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), flowchat::ChainError> {
//! let mut chain = Chain::openai("gpt-3.5-turbo", &ClientConfig::default())?;
//! chain
//!     .link("Where is the Eiffel tower?")?
//!     .pull(PullOptions::default().with_json_schema(json!({"city": "string"})))
//!     .await?;
//!
//! let city = chain.last()?.as_json().and_then(|answer| answer["city"].as_str());
//! println!("{city:?}");
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod tokens;
pub mod tools;

pub use chat::{
    BlockingChain, Chain, ChainError, ChainStream, ErrorKind, LinkOptions, Message, Modifier,
    PullOptions, Response, StreamEvent, StreamMode, StreamOptions,
};
pub use client::{ClientConfig, GenerationOptions, OpenAiClient, Provider, RetryPolicy};
pub use tokens::UsageRecord;
pub use tools::dedent::autodedent;
pub use tools::image::{Detail, ImageDescriptor, ImageRef, ImageSource};
