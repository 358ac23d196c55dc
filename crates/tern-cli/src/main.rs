use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::env;

use tern::agent::{Agent, AgentConfig};
use tern::developer::DeveloperToolkit;
use tern::toolkit::ToolRegistry;
use tern::transport::gemini::{GeminiClient, GeminiConfig, DEFAULT_MODEL};

mod prompt;
mod session;

use prompt::rustyline::RustylinePrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {
        /// API key (can also be set via the GEMINI_API_KEY environment variable)
        #[arg(long)]
        api_key: Option<String>,

        /// Model to use
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Maximum tokens the model may generate per response
        #[arg(long, default_value_t = 8192)]
        max_tokens: u32,

        /// Fetch completions over the streaming endpoint
        #[arg(long)]
        stream: bool,

        /// Log skipped stream objects and self-correction proposals
        #[arg(short, long)]
        verbose: bool,

        /// Send a single message and exit instead of starting the prompt
        #[arg(long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            api_key,
            model,
            max_tokens,
            stream,
            verbose,
            message,
        } => {
            let api_key = match api_key.or_else(|| env::var("GEMINI_API_KEY").ok()) {
                Some(key) => key,
                None => {
                    eprintln!(
                        "{}",
                        style(
                            "An API key is required: pass --api-key or set GEMINI_API_KEY"
                        )
                        .red()
                    );
                    std::process::exit(1);
                }
            };

            let mut config = GeminiConfig::new(api_key);
            config.model = model;
            config.max_output_tokens = max_tokens;
            config.verbose = verbose;
            let transport = GeminiClient::new(config)?;

            let registry = ToolRegistry::new(vec![Box::new(DeveloperToolkit::new())])?;
            let agent = Agent::new(
                Box::new(transport),
                registry,
                AgentConfig {
                    streaming: stream,
                    verbose,
                },
            );

            let mut session = Session::new(agent, Box::new(RustylinePrompt::new()));
            match message {
                Some(message) => session.headless(&message).await?,
                None => session.start().await?,
            }
        }
    }

    Ok(())
}
