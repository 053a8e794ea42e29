use std::time::Duration;

use anyhow::{Context, anyhow};
use flowchat::{
    Chain, ClientConfig, GenerationOptions, LinkOptions, Provider, PullOptions, Response,
    RetryPolicy, StreamEvent, StreamOptions,
};
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

pub struct CommandHandler<'a> {
    cli_command: &'a super::commands::Cli,
    stdin_str: String,
    user_prompt: Option<&'a str>,
}

impl<'a> CommandHandler<'a> {
    pub fn new(
        cli_command: &'a super::commands::Cli,
        stdin_str: String,
        user_prompt: Option<&'a str>,
    ) -> Self {
        Self {
            cli_command,
            stdin_str,
            user_prompt,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::default().with_environ_key(&self.cli_command.environ_key);
        match &self.cli_command.base_url {
            Some(base_url) => config.with_base_url(base_url),
            None => config,
        }
    }

    /// The prompt from the command line followed by piped stdin
    pub fn prompt(&self) -> Option<String> {
        let parts: Vec<&str> = [self.user_prompt, Some(self.stdin_str.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    fn generation(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.cli_command.max_tokens,
            temperature: self.cli_command.temperature,
            ..GenerationOptions::default()
        }
    }

    fn retry(&self) -> RetryPolicy {
        let mut retry = match self.cli_command.tries {
            Some(tries) => RetryPolicy::bounded(tries),
            None => RetryPolicy::unbounded(),
        };
        retry.max_query_time = self.cli_command.timeout.map(Duration::from_secs);
        retry
    }

    pub fn pull_options(&self) -> anyhow::Result<PullOptions> {
        let mut options = PullOptions::default()
            .with_generation(self.generation())
            .with_retry(self.retry());

        if let Some(schema) = &self.cli_command.json_schema {
            let schema = serde_json::from_str(schema).context("--json-schema is not valid JSON")?;
            options = options.with_json_schema(schema);
        }

        Ok(options)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::plain_text()
            .with_generation(self.generation())
            .with_retry(self.retry())
    }

    /// Anchor the system prompt and link the user prompt with its images
    pub fn prepare<P: Provider>(&self, chain: &mut Chain<P>) -> anyhow::Result<()> {
        if let Some(system) = &self.cli_command.system {
            chain.anchor(system.as_str())?;
        }

        let prompt = self
            .prompt()
            .ok_or_else(|| anyhow!("no prompt given, pass one as arguments or through stdin"))?;

        let options = self
            .cli_command
            .image
            .iter()
            .fold(LinkOptions::default(), |options, image| {
                options.with_image(image.as_str())
            });

        chain.link_with(prompt, options)?;
        Ok(())
    }

    /// Query the model and write the answer to `writer`
    pub async fn execute<P: Provider>(
        &self,
        chain: &mut Chain<P>,
        writer: &mut (impl AsyncWrite + Unpin),
    ) -> anyhow::Result<()> {
        self.prepare(chain)?;

        if self.cli_command.stream {
            info!("Streaming response");
            let mut stream = chain.stream(self.stream_options()).await?;
            while let Some(event) = stream.next().await {
                if let StreamEvent::Delta(content) = event? {
                    writer.write_all(content.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
            debug!("End of streaming");
        } else {
            info!("Pulling response");
            chain.pull(self.pull_options()?).await?;
            let content = match chain.last()? {
                Response::Text(text) => text.clone(),
                Response::Json(value) => serde_json::to_string_pretty(value)?,
            };
            writer.write_all(content.as_bytes()).await?;
        }
        writer.write_all(b"\n").await?;

        if self.cli_command.usage {
            chain.log_detailed_tokens();
            let (prompt, completion) = chain.token_usage();
            let usage = format!(
                "Prompt tokens: {}\nCompletion tokens: {}\nTotal tokens: {}\n",
                prompt,
                completion,
                prompt + completion
            );
            writer.write_all(usage.as_bytes()).await?;
        }

        writer.flush().await?;
        Ok(())
    }
}
