use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Switchboard LLM client
#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "One chat interface over OpenAI, Anthropic, Google, Mistral, and vLLM")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchboard.toml", env = "SWITCHBOARD_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one prompt and print the reply
    Chat(ChatArgs),
    /// List configured providers and their capabilities
    Providers,
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Provider name; defaults to the configured default
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model; defaults to the provider's default model
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    #[arg(short, long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the reply as it streams
    #[arg(long)]
    pub stream: bool,

    /// User prompt
    pub prompt: String,
}
