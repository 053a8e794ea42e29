use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tracing::{debug, warn};

use super::image::{image_token_cost, unknown_image_token_cost};
use super::ledger::UsageRecord;
use crate::chat::Message;
use crate::client::Usage;

/// Reply priming added by the backend to every prompt
const REPLY_PRIMING_TOKENS: u32 = 3;

static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Cached encoder for the model, `cl100k_base` for models tiktoken does not know.
fn encoder_for(model: &str) -> Option<&'static CoreBPE> {
    match get_tokenizer(model) {
        Some(Tokenizer::O200kBase) => O200K_BASE
            .get_or_init(|| tiktoken_rs::o200k_base().ok())
            .as_ref(),
        _ => CL100K_BASE
            .get_or_init(|| tiktoken_rs::cl100k_base().ok())
            .as_ref(),
    }
}

/// Number of tokens `text` encodes to for `model`.
pub fn count_text_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    match encoder_for(model) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => {
            warn!(model, "No BPE available, estimating token count");
            heuristic_token_count(text)
        }
    }
}

// Roughly four characters per token for English text
fn heuristic_token_count(text: &str) -> u32 {
    text.chars().count().div_ceil(4) as u32
}

/// Local estimate of the prompt tokens a request with `messages` will be billed for.
pub fn estimate_prompt_tokens(messages: &[Message], model: &str) -> u32 {
    let per_message = if model == "gpt-3.5-turbo-0301" { 4 } else { 3 };

    let tokens = messages
        .iter()
        .map(|message| {
            let images: u32 = message
                .content
                .images()
                .map(|image| match image.dimensions {
                    Some((width, height)) => image_token_cost(width, height, image.detail),
                    None => unknown_image_token_cost(),
                })
                .sum();

            per_message
                + count_text_tokens(message.role.as_str(), model)
                + count_text_tokens(message.content.text(), model)
                + images
        })
        .sum::<u32>();

    tokens + REPLY_PRIMING_TOKENS
}

/// Accumulates streamed text and closes the stream with a single usage record.
#[derive(Debug, Clone)]
pub struct StreamAccountant {
    model: String,
    prompt_tokens: u32,
    text: String,
}

impl StreamAccountant {
    pub fn new(model: impl Into<String>, messages: &[Message]) -> Self {
        let model = model.into();
        let prompt_tokens = estimate_prompt_tokens(messages, &model);
        debug!(%model, prompt_tokens, "Estimated prompt tokens");

        Self {
            model,
            prompt_tokens,
            text: String::new(),
        }
    }

    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Backend-reported figures win over the local estimate
    pub fn finish(self, reported: Option<&Usage>) -> UsageRecord {
        match reported {
            Some(usage) => UsageRecord::reported(self.model, usage),
            None => {
                let completion_tokens = count_text_tokens(&self.text, &self.model);
                UsageRecord::estimated(self.model, self.prompt_tokens, completion_tokens)
            }
        }
    }
}
