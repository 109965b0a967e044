#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use args::{Args, ChatArgs, Command};
use clap::Parser;
use futures_util::StreamExt;
use switchboard_config::GatewayConfig;
use switchboard_llm::{ChatRequest, LlmClient, Message, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = GatewayConfig::load(&args.config)?;
    switchboard_telemetry::init(&config.telemetry)?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    let client = LlmClient::new(&config)?;

    match args.command {
        Command::Chat(chat) if chat.stream => stream(&client, chat).await,
        Command::Chat(chat) => complete(&client, chat).await,
        Command::Providers => {
            for provider in client.providers() {
                println!(
                    "{}\t{}\t{}",
                    provider.name,
                    provider.kind,
                    serde_json::to_string(&provider.capabilities)?
                );
            }
            Ok(())
        }
    }
}

fn build_request(chat: ChatArgs) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = chat.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(chat.prompt));

    ChatRequest {
        provider: chat.provider,
        model: chat.model,
        temperature: chat.temperature,
        max_tokens: chat.max_tokens,
        stream: chat.stream,
        ..ChatRequest::new(messages)
    }
}

async fn complete(client: &LlmClient, chat: ChatArgs) -> anyhow::Result<()> {
    let response = client.chat(build_request(chat)).await?;

    println!("{}", response.content);
    for call in &response.tool_calls {
        println!("[tool call] {}({})", call.name, call.arguments_json());
    }
    if let Some(usage) = response.usage {
        tracing::info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion finished"
        );
    }
    Ok(())
}

async fn stream(client: &LlmClient, chat: ChatArgs) -> anyhow::Result<()> {
    let mut stream = client.stream(build_request(chat)).await?;

    let cancel = stream.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling stream");
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Delta(chunk) => {
                if let Some(text) = chunk.content {
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
            }
            StreamEvent::ToolCall(call) => {
                writeln!(stdout, "\n[tool call] {}({})", call.name, call.arguments_json())?;
            }
            StreamEvent::Error(message) => tracing::warn!(error = %message, "stream error"),
            StreamEvent::ToolResult(_) => {}
            StreamEvent::Done(summary) => {
                writeln!(stdout)?;
                tracing::info!(
                    state = ?summary.state,
                    finish_reason = ?summary.finish_reason,
                    "stream finished"
                );
            }
        }
    }

    Ok(())
}
