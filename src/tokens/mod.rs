//! Token accounting: per-call usage records, local BPE estimates and image costs.

mod counter;
mod image;
mod ledger;

pub use counter::{StreamAccountant, count_text_tokens, estimate_prompt_tokens};
pub use image::{image_token_cost, unknown_image_token_cost};
pub use ledger::{TokenLedger, UsageRecord, UsageSource};
