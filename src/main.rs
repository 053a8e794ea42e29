use clap::Parser;
use cli::commands::Cli;
use flowchat::Chain;
use std::io::{self, Read};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::handlers::CommandHandler;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut stdin_str = String::new();

    // Read only from piped stdin
    if !atty::is(atty::Stream::Stdin) {
        debug!("Reading from stdin");
        let stdin = io::stdin();
        stdin.lock().read_to_string(&mut stdin_str)?;
    }

    let user_prompt = cli.prompt.as_ref().map(|prompt| prompt.join(" "));
    let handler = CommandHandler::new(&cli, stdin_str, user_prompt.as_deref());

    let mut chain = Chain::openai(cli.model.as_str(), &handler.client_config())?;
    let mut writer = tokio::io::stdout();

    handler.execute(&mut chain, &mut writer).await
}

fn init_logging() -> anyhow::Result<()> {
    let file = std::fs::File::create(std::env::temp_dir().join("flowchat.log"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "flowchat=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(file))
        .init();
    Ok(())
}
