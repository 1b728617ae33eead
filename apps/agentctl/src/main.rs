use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::{AgentCapability, ChatRole, SessionId};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod client;

use client::SessionClient;

#[derive(Parser, Debug)]
#[command(about = "Drive a knowledge-base chat session from the terminal")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8501")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new session and print its id.
    Open,
    /// Show file, agent and message counts.
    Status { session: Uuid },
    Chat { session: Uuid, prompt: String },
    History { session: Uuid },
    Upload {
        session: Uuid,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Files { session: Uuid },
    Register {
        session: Uuid,
        name: String,
        url: String,
        #[arg(long, default_value = "general")]
        capability: String,
    },
    Agents { session: Uuid },
    DeleteAgent { session: Uuid, index: usize },
    /// Clear chat history and files; agents stay registered.
    Clear { session: Uuid },
    Reset { session: Uuid },
    Close { session: Uuid },
    Speak { session: Uuid, text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();
    let client = SessionClient::new(cli.server_url);

    match cli.command {
        Command::Open => {
            let summary = client.open().await?;
            println!("session_id={}", summary.session_id);
        }
        Command::Status { session } => {
            let summary = client.summary(SessionId(session)).await?;
            println!(
                "files={} agents={} messages={}",
                summary.files, summary.agents, summary.messages
            );
        }
        Command::Chat { session, prompt } => match client.chat(SessionId(session), &prompt).await? {
            Some(turn) => println!("{}", turn.assistant.content),
            None => println!("(empty prompt ignored)"),
        },
        Command::History { session } => {
            for message in client.history(SessionId(session)).await? {
                let speaker = match message.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                println!("[{speaker}] {}", message.content);
            }
        }
        Command::Upload { session, paths } => {
            let report = client.upload(SessionId(session), &paths).await?;
            for notice in &report.notices {
                println!("{}", notice.message);
            }
            for rejected in &report.rejected {
                println!("skipped {} ({:?})", rejected.name, rejected.reason);
            }
        }
        Command::Files { session } => {
            for file in client.files(SessionId(session)).await? {
                println!("{}", file.name);
            }
        }
        Command::Register {
            session,
            name,
            url,
            capability,
        } => {
            let registered = client
                .register(SessionId(session), &name, &url, AgentCapability::from(capability))
                .await?;
            println!("{} (index {})", registered.notice.message, registered.index);
        }
        Command::Agents { session } => {
            for listing in client.agents(SessionId(session)).await? {
                println!(
                    "{}: {}",
                    listing.index,
                    serde_json::to_string(&listing.agent)?
                );
            }
        }
        Command::DeleteAgent { session, index } => {
            let removed = client.delete_agent(SessionId(session), index).await?;
            println!("removed {}", removed.name);
        }
        Command::Clear { session } => {
            let cleared = client.clear(SessionId(session)).await?;
            println!("{}", cleared.notice.message);
        }
        Command::Reset { session } => {
            client.reset(SessionId(session)).await?;
            println!("session reset");
        }
        Command::Close { session } => {
            client.close(SessionId(session)).await?;
            println!("session closed");
        }
        Command::Speak { session, text } => {
            let response = client.speak(SessionId(session), &text).await?;
            println!("{}", response.notice.message);
        }
    }

    Ok(())
}
