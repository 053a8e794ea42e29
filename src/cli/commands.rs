use clap::Parser;

/// Send a prompt to a chat-completion model, optionally with a system prompt, images or a
/// JSON format to answer in.
#[derive(Parser, Debug)]
#[command(name = "flowchat", version, about, long_about = None)]
pub struct Cli {
    /// Model to query
    #[arg(short, long, default_value = "gpt-3.5-turbo")]
    pub model: String,

    /// System prompt anchoring the conversation
    #[arg(short, long)]
    pub system: Option<String>,

    /// Print the response while it is generated
    #[arg(long, conflicts_with = "json_schema")]
    pub stream: bool,

    /// Example JSON object the answer must follow
    #[arg(short, long)]
    pub json_schema: Option<String>,

    /// Upper bound of generated tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Seconds allowed for a single request
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts before giving up; retries forever when omitted
    #[arg(long)]
    pub tries: Option<u32>,

    /// Image URLs to attach to the prompt
    #[arg(short, long, value_delimiter = ',')]
    pub image: Vec<String>,

    /// Environment variable holding the API key
    #[arg(long, default_value = "OPENAI_API_KEY")]
    pub environ_key: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Print the token usage after the response
    #[arg(short, long)]
    pub usage: bool,

    /// Prompt to send
    #[arg(trailing_var_arg = true)]
    pub prompt: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_args() {
        let req = vec!["flowchat", "hello", "there,", "tell", "me", "something"];
        let cli = Cli::parse_from(req);

        assert_eq!(cli.model, "gpt-3.5-turbo");
        assert!(!cli.stream);
        assert_eq!(
            cli.prompt.expect("prompt args"),
            vec!["hello", "there,", "tell", "me", "something"]
        );
    }

    #[test]
    fn test_option_args() {
        let req = vec![
            "flowchat",
            "-m",
            "gpt-4o",
            "--system",
            "Be brief",
            "--max-tokens",
            "64",
            "--tries",
            "3",
            "--image",
            "https://a.png,https://b.png",
            "describe",
            "these",
        ];
        let cli = Cli::parse_from(req);

        assert_eq!(cli.model, "gpt-4o");
        assert_eq!(cli.system.as_deref(), Some("Be brief"));
        assert_eq!(cli.max_tokens, Some(64));
        assert_eq!(cli.tries, Some(3));
        assert_eq!(cli.image, vec!["https://a.png", "https://b.png"]);
        assert_eq!(cli.prompt.expect("prompt args"), vec!["describe", "these"]);
    }

    #[test]
    fn test_stream_conflicts_with_schema() {
        let req = vec!["flowchat", "--stream", "--json-schema", "{}", "hi"];
        assert!(Cli::try_parse_from(req).is_err());
    }
}
