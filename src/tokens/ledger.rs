use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::Usage;

/// Where the numbers of a [`UsageRecord`] come from
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
    Reported,
    Estimated,
}

/// Token usage of one backend call
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub timestamp: DateTime<Utc>,
    pub source: UsageSource,
}

impl UsageRecord {
    pub fn reported(model: impl Into<String>, usage: &Usage) -> Self {
        Self {
            model: model.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            timestamp: Utc::now(),
            source: UsageSource::Reported,
        }
    }

    pub fn estimated(model: impl Into<String>, prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            timestamp: Utc::now(),
            source: UsageSource::Estimated,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

/// Running token totals plus the history of every recorded call
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    prompt_tokens: u64,
    completion_tokens: u64,
    history: Vec<UsageRecord>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: UsageRecord) {
        self.prompt_tokens += u64::from(record.prompt_tokens);
        self.completion_tokens += u64::from(record.completion_tokens);
        self.history.push(record);
    }

    /// `(prompt_tokens, completion_tokens)` summed over every recorded call
    pub fn totals(&self) -> (u64, u64) {
        (self.prompt_tokens, self.completion_tokens)
    }

    pub fn history(&self) -> &[UsageRecord] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.prompt_tokens = 0;
        self.completion_tokens = 0;
        self.history.clear();
    }
}
