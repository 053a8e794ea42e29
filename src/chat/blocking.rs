//! Synchronous wrapper over [`Chain`], for callers without an async runtime.

use futures_util::StreamExt;
use tokio::runtime::{Builder, Runtime};

use super::{
    Chain, ChainError, ChainStream, LinkOptions, Message, Modifier, PullOptions, Response,
    StreamEvent, StreamOptions,
};
use crate::client::{ClientConfig, OpenAiClient, Provider};
use crate::tokens::UsageRecord;

/// A [`Chain`] driven by its own current-thread runtime.
///
/// Calls block the current thread, so it must not be used from inside an async context.
pub struct BlockingChain<P: Provider> {
    runtime: Runtime,
    chain: Chain<P>,
}

impl BlockingChain<OpenAiClient> {
    pub fn openai(model: impl Into<String>, config: &ClientConfig) -> Result<Self, ChainError> {
        Self::from_chain(Chain::openai(model, config)?)
    }
}

impl<P: Provider> BlockingChain<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Result<Self, ChainError> {
        Self::from_chain(Chain::new(provider, model)?)
    }

    pub fn from_chain(chain: Chain<P>) -> Result<Self, ChainError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ChainError::Config(format!("cannot start runtime: {e}")))?;

        Ok(Self { runtime, chain })
    }

    pub fn anchor(&mut self, system_prompt: impl Into<String>) -> Result<&mut Self, ChainError> {
        self.chain.anchor(system_prompt)?;
        Ok(self)
    }

    pub fn link<'m>(&mut self, modifier: impl Into<Modifier<'m>>) -> Result<&mut Self, ChainError> {
        self.chain.link(modifier)?;
        Ok(self)
    }

    pub fn link_with<'m>(
        &mut self,
        modifier: impl Into<Modifier<'m>>,
        options: LinkOptions,
    ) -> Result<&mut Self, ChainError> {
        self.chain.link_with(modifier, options)?;
        Ok(self)
    }

    /// Blocks until the response is stored
    pub fn pull(&mut self, options: PullOptions) -> Result<&mut Self, ChainError> {
        self.runtime.block_on(self.chain.pull(options))?;
        Ok(self)
    }

    pub fn stream(&mut self, options: StreamOptions) -> Result<BlockingStream<'_>, ChainError> {
        let inner = self.runtime.block_on(self.chain.stream(options))?;
        Ok(BlockingStream {
            runtime: &self.runtime,
            inner,
        })
    }

    pub fn transform(&mut self, f: impl FnOnce(Response) -> Response) -> &mut Self {
        self.chain.transform(f);
        self
    }

    pub fn unhook(&mut self) -> &mut Self {
        self.chain.unhook();
        self
    }

    pub fn last(&self) -> Result<&Response, ChainError> {
        self.chain.last()
    }

    pub fn system(&self) -> Option<&Message> {
        self.chain.system()
    }

    pub fn turns(&self) -> &[Message] {
        self.chain.turns()
    }

    pub fn token_usage(&self) -> (u64, u64) {
        self.chain.token_usage()
    }

    pub fn detailed_token_usage(&self) -> &[UsageRecord] {
        self.chain.detailed_token_usage()
    }

    pub fn reset_usage(&mut self) -> &mut Self {
        self.chain.reset_usage();
        self
    }

    pub fn log(&mut self) -> &mut Self {
        self.chain.log();
        self
    }

    pub fn log_tokens(&mut self) -> &mut Self {
        self.chain.log_tokens();
        self
    }

    pub fn log_detailed_tokens(&mut self) -> &mut Self {
        self.chain.log_detailed_tokens();
        self
    }

    pub fn chain(&self) -> &Chain<P> {
        &self.chain
    }

    pub fn into_inner(self) -> Chain<P> {
        self.chain
    }
}

/// Iterator over the events of a streamed call; each `next` blocks on the network.
pub struct BlockingStream<'a> {
    runtime: &'a Runtime,
    inner: ChainStream<'a>,
}

impl Iterator for BlockingStream<'_> {
    type Item = Result<StreamEvent, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ErrorKind;
    use crate::client::provider::tests::{TestProvider, sse_frames};

    #[test]
    fn pull_blocks_until_the_response_is_stored() {
        let mut chain = BlockingChain::new(
            TestProvider::with_replies(&[("4", 10, 5), ("8", 20, 15)]),
            "gpt-3.5-turbo",
        )
        .expect("blocking chain");

        chain
            .anchor("You do arithmetic")
            .expect("anchor")
            .link("2 + 2?")
            .expect("link")
            .pull(PullOptions::default())
            .expect("first pull")
            .unhook()
            .link(Modifier::compute(|last| {
                format!("Double {}", last.expect("first response"))
            }))
            .expect("link")
            .pull(PullOptions::default())
            .expect("second pull");

        assert_eq!(chain.last().expect("response").as_text(), Some("8"));
        assert_eq!(chain.turns()[0].content.text(), "Double 4");
        assert_eq!(chain.token_usage(), (30, 20));
    }

    #[test]
    fn stream_iterates_events() {
        let mut chain = BlockingChain::new(
            TestProvider::with_frames(sse_frames(&["a", "b", "c"], Some((3, 3)))),
            "gpt-3.5-turbo",
        )
        .expect("blocking chain");
        chain.link("letters").expect("link");

        let events: Vec<_> = chain
            .stream(StreamOptions::plain_text())
            .expect("open stream")
            .collect::<Result<_, _>>()
            .expect("all events");

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], StreamEvent::Delta("a".to_string()));
        assert!(matches!(events[3], StreamEvent::Usage(_)));
        assert_eq!(chain.token_usage(), (3, 3));
    }

    #[test]
    fn usage_errors_surface_without_blocking() {
        let mut chain =
            BlockingChain::new(TestProvider::new(), "gpt-3.5-turbo").expect("blocking chain");

        let error = chain
            .pull(PullOptions::default())
            .err()
            .expect("no turns");
        assert_eq!(error.kind(), ErrorKind::Usage);
    }
}
