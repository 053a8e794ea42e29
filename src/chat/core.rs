use tracing::{debug, info, trace};

use super::{
    ChainError, ChainStream, Content, ContentPart, LinkOptions, Message, PullOptions, Response,
    Role, StreamOptions, prompts::json_schema_instruction, response, stream::decode_events,
};
use crate::client::{
    ChatCompletion, ChatRequest, ClientConfig, OpenAiClient, Provider, ResponseFormat,
    execute_with_retry,
};
use crate::tokens::{
    StreamAccountant, TokenLedger, UsageRecord, count_text_tokens, estimate_prompt_tokens,
};

/// Model used for structured (JSON) pulls unless overridden
pub const STRUCTURED_MODEL: &str = "gpt-4-1106-preview";

/// The text of a new turn: given directly, or computed from the last response.
pub enum Modifier<'a> {
    Text(String),
    Compute(Box<dyn FnOnce(Option<&Response>) -> String + 'a>),
}

impl<'a> Modifier<'a> {
    /// Build the turn from the last response, `None` before the first pull
    pub fn compute(f: impl FnOnce(Option<&Response>) -> String + 'a) -> Self {
        Self::Compute(Box::new(f))
    }
}

impl From<&str> for Modifier<'_> {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Modifier<'_> {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A conversation under construction.
///
/// Holds an optional system prompt (the anchor), the pending turns and the last response.
/// Every mutator returns `&mut Self` so calls can be chained:
///
/// ```rust,no_run
/// use flowchat::{Chain, ClientConfig, Modifier, PullOptions};
///
/// # async fn run() -> Result<(), flowchat::ChainError> {
/// let mut chain = Chain::openai("gpt-3.5-turbo", &ClientConfig::default())?;
/// chain
///     .anchor("You are a terse assistant.")?
///     .link("Name a prime number.")?
///     .pull(PullOptions::default())
///     .await?
///     .unhook()
///     .link(Modifier::compute(|last| format!("Is {} really prime?", last.map(|r| r.to_string()).unwrap_or_default())))?
///     .pull(PullOptions::default())
///     .await?;
///
/// println!("{}", chain.last()?);
/// # Ok(())
/// # }
/// ```
pub struct Chain<P: Provider> {
    provider: P,
    model: String,
    structured_model: String,
    system: Option<Message>,
    turns: Vec<Message>,
    response: Option<Response>,
    usage: TokenLedger,
}

impl Chain<OpenAiClient> {
    /// Chain over the OpenAI API, with credentials resolved from `config`
    pub fn openai(model: impl Into<String>, config: &ClientConfig) -> Result<Self, ChainError> {
        let client = OpenAiClient::new(config)?;
        Self::new(client, model)
    }
}

impl<P: Provider> Chain<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Result<Self, ChainError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ChainError::InvalidArgument(
                "model must not be empty".to_string(),
            ));
        }

        Ok(Self {
            provider,
            model,
            structured_model: STRUCTURED_MODEL.to_string(),
            system: None,
            turns: vec![],
            response: None,
            usage: TokenLedger::new(),
        })
    }

    pub fn with_structured_model(mut self, model: impl Into<String>) -> Self {
        self.structured_model = model.into();
        self
    }

    /// Set the system prompt, replacing the previous one
    pub fn anchor(&mut self, system_prompt: impl Into<String>) -> Result<&mut Self, ChainError> {
        let system_prompt = system_prompt.into();
        if system_prompt.is_empty() {
            return Err(ChainError::Usage(
                "system prompt cannot be empty".to_string(),
            ));
        }

        debug!(%system_prompt, "Anchoring");
        self.system = Some(Message::system(system_prompt));
        Ok(self)
    }

    /// Append a user turn
    pub fn link<'m>(&mut self, modifier: impl Into<Modifier<'m>>) -> Result<&mut Self, ChainError> {
        self.link_with(modifier, LinkOptions::default())
    }

    /// Append a turn, as the assistant and/or with images attached
    pub fn link_with<'m>(
        &mut self,
        modifier: impl Into<Modifier<'m>>,
        options: LinkOptions,
    ) -> Result<&mut Self, ChainError> {
        let prompt = match modifier.into() {
            Modifier::Text(text) if text.is_empty() => {
                return Err(ChainError::Usage(
                    "modifier cannot be an empty string".to_string(),
                ));
            }
            Modifier::Text(text) => text,
            Modifier::Compute(compute) => compute(self.response.as_ref()),
        };

        let role = if options.assistant {
            Role::Assistant
        } else {
            Role::User
        };

        let content = if options.images.is_empty() {
            Content::Text(prompt)
        } else {
            let mut parts = Vec::with_capacity(options.images.len() + 1);
            parts.push(ContentPart::Text { text: prompt });
            for image in options.images {
                parts.push(ContentPart::ImageUrl {
                    image_url: image.normalize()?,
                });
            }
            Content::Parts(parts)
        };

        trace!(role = role.as_str(), ?content, "Linking turn");
        self.turns.push(Message::new(role, content));
        Ok(self)
    }

    /// Send the conversation and store the normalized response.
    ///
    /// With a JSON schema the last turn asks for that format, the response must contain a JSON
    /// object and the structured model is used. The format instruction is only added to the
    /// request: the stored turn keeps the text it was linked with, so pulling again does not
    /// repeat the instruction. The anchor and turns are kept, so pulling again resends them.
    pub async fn pull(&mut self, options: PullOptions) -> Result<&mut Self, ChainError> {
        let PullOptions {
            model,
            mut generation,
            json_schema,
            retry,
        } = options;

        let mut messages = self.request_messages()?;
        let mut model = model.unwrap_or_else(|| self.model.clone());

        let structured = match &json_schema {
            Some(schema) => {
                let instruction = json_schema_instruction(schema)?;
                if let Some(last) = messages.last_mut() {
                    last.content.push_text("\n");
                    last.content.push_text(&instruction);
                }
                generation.response_format = Some(ResponseFormat::JsonObject);
                model = self.structured_model.clone();
                true
            }
            None => false,
        };

        let mut request = ChatRequest::new(model, messages);
        request.generation = generation;

        info!(model = %request.model, turns = self.turns.len(), structured, "Pulling response");
        let provider = &self.provider;
        let completion =
            execute_with_retry(&retry, "pull", |_| provider.complete(request.clone())).await?;

        let response = response::normalize(&completion, structured)?;
        let record = usage_record(&completion, &request);
        debug!(
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            "Response received"
        );

        self.usage.record(record);
        self.response = Some(response);
        Ok(self)
    }

    /// Send the conversation in streaming mode.
    ///
    /// The returned stream yields fragments or text deltas, then one usage event. Unlike
    /// [`Chain::pull`] it does not change the last response.
    pub async fn stream(&mut self, options: StreamOptions) -> Result<ChainStream<'_>, ChainError> {
        let StreamOptions {
            mode,
            model,
            generation,
            retry,
        } = options;

        let messages = self.request_messages()?;
        let model = model.unwrap_or_else(|| self.model.clone());

        let mut request = ChatRequest::new(model, messages).streaming();
        request.generation = generation;
        let accountant = StreamAccountant::new(request.model.clone(), &request.messages);

        info!(model = %request.model, turns = self.turns.len(), ?mode, "Streaming response");
        let provider = &self.provider;
        let bytes =
            execute_with_retry(&retry, "stream", |_| provider.request(request.clone())).await?;

        Ok(decode_events(bytes, mode, accountant, &mut self.usage))
    }

    /// Replace the last response with `f` applied to it. Does nothing before the first pull.
    pub fn transform(&mut self, f: impl FnOnce(Response) -> Response) -> &mut Self {
        if let Some(response) = self.response.take() {
            self.response = Some(f(response));
        }
        self
    }

    /// Forget the anchor and the pending turns. The last response and usage are kept.
    pub fn unhook(&mut self) -> &mut Self {
        debug!(turns = self.turns.len(), "Unhooking");
        self.system = None;
        self.turns.clear();
        self
    }

    pub fn last(&self) -> Result<&Response, ChainError> {
        self.response
            .as_ref()
            .ok_or_else(|| ChainError::Usage("no response has been pulled yet".to_string()))
    }

    pub fn system(&self) -> Option<&Message> {
        self.system.as_ref()
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// `(prompt_tokens, completion_tokens)` used so far
    pub fn token_usage(&self) -> (u64, u64) {
        self.usage.totals()
    }

    pub fn detailed_token_usage(&self) -> &[UsageRecord] {
        self.usage.history()
    }

    pub fn reset_usage(&mut self) -> &mut Self {
        self.usage.reset();
        self
    }

    pub fn log(&mut self) -> &mut Self {
        let system = self.system.as_ref().map(|message| message.content.text());
        let turns = serde_json::to_string(&self.turns).unwrap_or_default();
        let response = self.response.as_ref().map(ToString::to_string);
        info!(?system, %turns, ?response, "Chain state");
        self
    }

    pub fn log_tokens(&mut self) -> &mut Self {
        let (prompt, completion) = self.token_usage();
        info!(prompt, completion, total = prompt + completion, "Token usage");
        self
    }

    pub fn log_detailed_tokens(&mut self) -> &mut Self {
        for (call, record) in self.usage.history().iter().enumerate() {
            info!(
                call,
                model = %record.model,
                prompt = record.prompt_tokens,
                completion = record.completion_tokens,
                source = ?record.source,
                timestamp = %record.timestamp,
                "Token usage of call"
            );
        }
        self.log_tokens()
    }

    /// Anchor followed by the pending turns; fails when there is no turn to send.
    fn request_messages(&self) -> Result<Vec<Message>, ChainError> {
        if self.turns.is_empty() {
            return Err(ChainError::Usage(
                "nothing to send, link a prompt first".to_string(),
            ));
        }

        Ok(self
            .system
            .iter()
            .chain(self.turns.iter())
            .cloned()
            .collect())
    }
}

fn usage_record(completion: &ChatCompletion, request: &ChatRequest) -> UsageRecord {
    match &completion.usage {
        Some(usage) => UsageRecord::reported(request.model.as_str(), usage),
        None => {
            let text = response::completion_text(completion).unwrap_or_default();
            UsageRecord::estimated(
                request.model.as_str(),
                estimate_prompt_tokens(&request.messages, &request.model),
                count_text_tokens(text, &request.model),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures_util::StreamExt;
    use image::DynamicImage;
    use serde_json::json;

    use super::*;
    use crate::chat::{ErrorKind, StreamEvent};
    use crate::client::provider::tests::{TestProvider, completion_with, sse_frames};
    use crate::client::{ProviderError, RetryPolicy};
    use crate::tokens::UsageSource;
    use crate::tools::image::{Detail, ImageDescriptor, ImageRef};

    fn chain(provider: TestProvider) -> Chain<TestProvider> {
        Chain::new(provider, "gpt-3.5-turbo").expect("valid model")
    }

    #[test]
    fn blank_model_is_rejected() {
        let error = Chain::new(TestProvider::new(), " ")
            .err()
            .expect("blank model");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn anchor_replaces_the_system_prompt() {
        let mut chain = chain(TestProvider::new());
        chain
            .anchor("first")
            .expect("anchor")
            .anchor("second")
            .expect("anchor");

        assert_eq!(chain.system().map(|m| m.content.text()), Some("second"));
        assert_eq!(
            chain.anchor("").err().map(|e| e.kind()),
            Some(ErrorKind::Usage)
        );
    }

    #[test]
    fn empty_link_is_a_usage_error() {
        let mut chain = chain(TestProvider::new());
        let error = chain.link("").err().expect("empty modifier");

        assert_eq!(error.kind(), ErrorKind::Usage);
        assert!(chain.turns().is_empty());
    }

    #[test]
    fn compute_modifier_runs_once_with_the_last_response() {
        let mut chain = chain(TestProvider::new());
        let calls = Cell::new(0);

        chain
            .link(Modifier::compute(|last| {
                calls.set(calls.get() + 1);
                assert!(last.is_none());
                "first".to_string()
            }))
            .expect("link");

        chain.response = Some(Response::from("previous"));
        chain
            .link(Modifier::compute(|last| {
                calls.set(calls.get() + 1);
                format!("about {}", last.expect("response").to_string())
            }))
            .expect("link");

        assert_eq!(calls.get(), 2);
        assert_eq!(chain.turns()[1].content.text(), "about previous");
    }

    #[test]
    fn assistant_turns_and_images() {
        let mut chain = chain(TestProvider::new());
        chain
            .link_with("I am the assistant", LinkOptions::assistant())
            .expect("assistant link")
            .link_with(
                "What is in these?",
                LinkOptions::default()
                    .with_image("https://example.com/cat.png")
                    .with_image(DynamicImage::new_rgb8(2, 2))
                    .with_image(ImageDescriptor {
                        url: Some(crate::tools::image::ImageSource::Url(
                            "https://example.com/dog.png".to_string(),
                        )),
                        format_type: None,
                        detail: Some(Detail::Low),
                    }),
            )
            .expect("image link");

        assert_eq!(chain.turns()[0].role, Role::Assistant);

        let turn = &chain.turns()[1];
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content.text(), "What is in these?");

        let images: Vec<_> = turn.content.images().collect();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].url, "https://example.com/cat.png");
        assert!(images[1].url.starts_with("data:image/png;base64,"));
        assert_eq!(images[2].detail, Some(Detail::Low));
    }

    #[test]
    fn bad_image_leaves_the_turns_untouched() {
        let mut chain = chain(TestProvider::new());
        let error = chain
            .link_with(
                "look",
                LinkOptions::default().with_image(ImageRef::Descriptor(ImageDescriptor::default())),
            )
            .err()
            .expect("descriptor without url");

        assert_eq!(error.kind(), ErrorKind::Usage);
        assert!(chain.turns().is_empty());
    }

    #[tokio::test]
    async fn unhook_keeps_the_response_and_usage() {
        let mut chain = chain(TestProvider::with_replies(&[("kept", 10, 5)]));
        chain.anchor("system").expect("anchor").link("hi").expect("link");
        chain.pull(PullOptions::default()).await.expect("pull");

        chain.unhook();

        assert!(chain.system().is_none());
        assert!(chain.turns().is_empty());
        assert_eq!(chain.last().expect("response").as_text(), Some("kept"));
        assert_eq!(chain.token_usage(), (10, 5));
        assert_eq!(chain.detailed_token_usage().len(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn openai_stream_can_be_driven_from_a_spawned_task() {
        let config = ClientConfig::default().with_api_key("sk-test");
        let mut chain = Chain::openai("gpt-3.5-turbo", &config).expect("chain");
        chain.link("hello").expect("link");

        let drive = async move {
            let mut stream = chain.stream(StreamOptions::plain_text()).await?;
            while let Some(event) = stream.next().await {
                event?;
            }
            Ok::<_, ChainError>(())
        };

        assert_send(&drive);
    }

    #[test]
    fn last_before_any_pull_is_a_usage_error() {
        let chain = chain(TestProvider::new());
        assert_eq!(chain.last().err().map(|e| e.kind()), Some(ErrorKind::Usage));
    }

    #[test]
    fn transform_only_applies_to_an_existing_response() {
        let mut chain = chain(TestProvider::new());
        chain.transform(|_| Response::from("never"));
        assert!(chain.last().is_err());

        chain.response = Some(Response::from("hello"));
        chain.transform(|response| Response::from(response.to_string().to_uppercase()));
        assert_eq!(chain.last().expect("response").as_text(), Some("HELLO"));
    }

    #[tokio::test]
    async fn pull_without_turns_never_calls_the_backend() {
        let mut chain = chain(TestProvider::new());
        chain.anchor("system").expect("anchor");

        let error = chain
            .pull(PullOptions::default())
            .await
            .err()
            .expect("no turns");

        assert_eq!(error.kind(), ErrorKind::Usage);
        assert_eq!(chain.provider().calls(), 0);
    }

    #[tokio::test]
    async fn pull_sends_anchor_then_turns_and_stores_the_response() {
        let mut chain = chain(TestProvider::with_replies(&[("Paris", 10, 5)]));
        chain
            .anchor("You are a geographer")
            .expect("anchor")
            .link("Capital of France?")
            .expect("link")
            .pull(PullOptions::default())
            .await
            .expect("pull");

        let request = chain.provider().last_request();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content.text(), "Capital of France?");

        assert_eq!(chain.last().expect("response").as_text(), Some("Paris"));
        assert_eq!(chain.turns().len(), 1);
        assert!(chain.system().is_some());
    }

    #[tokio::test]
    async fn usage_accumulates_across_pulls() {
        let mut chain = chain(TestProvider::with_replies(&[("a", 10, 5), ("b", 20, 15)]));
        chain.link("one").expect("link");
        chain.pull(PullOptions::default()).await.expect("first pull");
        chain.pull(PullOptions::default()).await.expect("second pull");

        assert_eq!(chain.token_usage(), (30, 20));
        assert_eq!(chain.detailed_token_usage().len(), 2);
        assert!(
            chain
                .detailed_token_usage()
                .iter()
                .all(|record| record.source == UsageSource::Reported)
        );

        chain.reset_usage();
        assert_eq!(chain.token_usage(), (0, 0));
    }

    #[tokio::test]
    async fn repeated_pulls_resend_the_context() {
        let mut chain = chain(TestProvider::with_replies(&[("a", 1, 1), ("b", 1, 1)]));
        chain.link("one").expect("link");
        chain.pull(PullOptions::default()).await.expect("first pull");
        chain.link("two").expect("link");
        chain.pull(PullOptions::default()).await.expect("second pull");

        let request = chain.provider().last_request();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content.text(), "one");
    }

    #[tokio::test]
    async fn schema_pull_parses_the_json_object() {
        let provider = TestProvider::new();
        provider.push_reply(Ok(completion_with(r#"noise {"city": "Paris"} trailing"#, 3, 4)));

        let mut chain = chain(provider);
        chain
            .link("Where is the Eiffel tower?")
            .expect("link")
            .pull(PullOptions::default().with_json_schema(json!({"city": "string"})))
            .await
            .expect("structured pull");

        assert_eq!(
            chain.last().expect("response").as_json(),
            Some(&json!({"city": "Paris"}))
        );

        let request = chain.provider().last_request();
        assert_eq!(request.model, STRUCTURED_MODEL);
        assert_eq!(
            request.generation.response_format,
            Some(ResponseFormat::JsonObject)
        );

        let prompt = request.messages[0].content.text();
        assert!(prompt.starts_with("Where is the Eiffel tower?\nYou must respond"));
        assert!(prompt.ends_with("{\n    \"city\": \"string\"\n}"));

        // stored turns are left as linked
        assert_eq!(chain.turns()[0].content.text(), "Where is the Eiffel tower?");
        assert_eq!(chain.token_usage(), (3, 4));
    }

    #[tokio::test]
    async fn repeated_schema_pull_sends_the_instruction_once() {
        let provider = TestProvider::new();
        provider.push_reply(Ok(completion_with(r#"{"city": "Paris"}"#, 3, 4)));
        provider.push_reply(Ok(completion_with(r#"{"city": "Rome"}"#, 3, 4)));
        let schema = json!({"city": "string"});

        let mut chain = chain(provider);
        chain.link("Capital?").expect("link");
        chain
            .pull(PullOptions::default().with_json_schema(schema.clone()))
            .await
            .expect("first pull");
        chain
            .pull(PullOptions::default().with_json_schema(schema))
            .await
            .expect("second pull");

        let requests = chain.provider().requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages, requests[1].messages);
        assert_eq!(
            requests[1].messages[0].content.text().matches("You must respond").count(),
            1
        );
        assert_eq!(chain.turns()[0].content.text(), "Capital?");
    }

    #[tokio::test]
    async fn schema_pull_without_json_keeps_state() {
        let mut chain = chain(TestProvider::with_replies(&[("Paris", 3, 4)]))
            .with_structured_model("gpt-4o");
        chain.link("Capital?").expect("link");

        let error = chain
            .pull(PullOptions::default().with_json_schema(json!({"city": "string"})))
            .await
            .err()
            .expect("no JSON in response");

        assert_eq!(error.kind(), ErrorKind::StructuredParse);
        assert_eq!(chain.provider().last_request().model, "gpt-4o");
        assert!(chain.last().is_err());
        assert_eq!(chain.token_usage(), (0, 0));
    }

    #[tokio::test]
    async fn non_object_schema_is_an_invalid_argument() {
        let mut chain = chain(TestProvider::new());
        chain.link("hi").expect("link");

        let error = chain
            .pull(PullOptions::default().with_json_schema(json!(["city"])))
            .await
            .err()
            .expect("array schema");

        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert_eq!(chain.provider().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_without_corrupting_state() {
        let provider = TestProvider::new();
        provider.push_reply(Err(ProviderError::rate_limited("slow down")));
        provider.push_reply(Err(ProviderError::transport("reset")));
        provider.push_reply(Ok(completion_with("done", 1, 1)));

        let mut chain = chain(provider);
        chain.link("hi").expect("link");
        chain.pull(PullOptions::default()).await.expect("pull");

        assert_eq!(chain.provider().calls(), 3);
        assert_eq!(chain.turns().len(), 1);
        assert_eq!(chain.detailed_token_usage().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_cause() {
        let provider = TestProvider::new();
        provider.push_reply(Err(ProviderError::unavailable("down")));
        provider.push_reply(Err(ProviderError::unavailable("still down")));

        let mut chain = chain(provider);
        chain.link("hi").expect("link");
        chain.response = Some(Response::from("previous"));

        let error = chain
            .pull(PullOptions::default().with_retry(RetryPolicy::bounded(2)))
            .await
            .err()
            .expect("backend down");

        assert_eq!(
            error.provider_error().map(|e| e.message.as_str()),
            Some("still down")
        );
        assert_eq!(chain.last().expect("response").as_text(), Some("previous"));
    }

    #[tokio::test]
    async fn missing_usage_is_estimated() {
        let provider = TestProvider::new();
        provider.push_reply(Ok(serde_json::from_value(json!({
            "choices": [{"message": {"content": "hello world"}}]
        }))
        .expect("valid completion")));

        let mut chain = chain(provider);
        chain.link("hi").expect("link");
        chain.pull(PullOptions::default()).await.expect("pull");

        let record = &chain.detailed_token_usage()[0];
        assert_eq!(record.source, UsageSource::Estimated);
        assert_eq!(record.completion_tokens, 2);
        assert!(record.prompt_tokens > 0);
    }

    #[tokio::test]
    async fn plain_text_stream_yields_every_delta_then_usage() {
        let deltas = ["Rust "; 10];
        let mut chain = chain(TestProvider::with_frames(sse_frames(&deltas, Some((12, 10)))));
        chain.link("hello").expect("link");

        let events: Vec<_> = chain
            .stream(StreamOptions::plain_text())
            .await
            .expect("open stream")
            .collect()
            .await;

        let deltas = events
            .iter()
            .filter(|event| matches!(event, Ok(StreamEvent::Delta(_))))
            .count();
        let usages = events
            .iter()
            .filter(|event| matches!(event, Ok(StreamEvent::Usage(_))))
            .count();

        assert_eq!(deltas, 10);
        assert_eq!(usages, 1);
        assert_eq!(chain.token_usage(), (12, 10));
        assert!(chain.last().is_err());

        let request = chain.provider().last_request();
        assert!(request.stream);
        assert_eq!(request.stream_options.map(|o| o.include_usage), Some(true));
    }

    #[tokio::test]
    async fn stream_without_turns_never_calls_the_backend() {
        let mut chain = chain(TestProvider::with_frames(sse_frames(&["x"], None)));

        let error = chain
            .stream(StreamOptions::default())
            .await
            .err()
            .expect("no turns");

        assert_eq!(error.kind(), ErrorKind::Usage);
        assert_eq!(chain.provider().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opening_a_stream_is_retried() {
        let provider = TestProvider::with_frames(sse_frames(&["ok"], None));
        provider.fail_streams(2);

        let mut chain = chain(provider);
        chain.link("hello").expect("link");

        let text = chain
            .stream(StreamOptions::plain_text())
            .await
            .expect("open stream")
            .collect_text()
            .await
            .expect("stream text");

        assert_eq!(text, "ok");
        assert_eq!(chain.provider().calls(), 3);
        assert_eq!(
            chain.detailed_token_usage()[0].source,
            UsageSource::Estimated
        );
    }
}
