//! nodle - terminal chat client
//!
//! Connects to a nodle daemon, shows its prompts as readable text and
//! sends every line typed on stdin back to it.
//!
//! # Usage
//!
//! ```text
//! nodle                        # connect to 127.0.0.1:9001
//! nodle --host chat.local -p 4000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use nodle_client::TcpChatClient;
use nodle_protocol::{ServerMessage, DEFAULT_PORT};

// ============================================================================
// CLI Arguments
// ============================================================================

/// nodle - terminal chat client
#[derive(Parser, Debug)]
#[command(name = "nodle", version, about)]
struct Args {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, env = "NODLE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

// ============================================================================
// Rendering
// ============================================================================

/// Human-readable text for a server message.
fn render(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::SubmitName => "Account name:".to_string(),
        ServerMessage::SubmitPass => "Password:".to_string(),
        ServerMessage::InvalidName => "No such account. Create it? (yes/no)".to_string(),
        ServerMessage::SubmitNewPass => "New password:".to_string(),
        ServerMessage::VerifyPass => "Repeat new password:".to_string(),
        ServerMessage::MismatchPass => "Passwords did not match.".to_string(),
        ServerMessage::AccountCreated => "Account created. Log in to continue.".to_string(),
        ServerMessage::AccountAccepted => "Password accepted.".to_string(),
        ServerMessage::NameAccepted => "You are in. Type to chat.".to_string(),
        ServerMessage::Message { name, text } => format!("{name}: {text}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with the conversation
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("nodle_client=warn".parse()?),
        )
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    let mut client = TcpChatClient::connect(addr.as_str())
        .await
        .with_context(|| format!("Could not reach {addr}"))?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            msg = client.recv() => {
                match msg.context("Lost connection to server")? {
                    Some(msg) => println!("{}", render(&msg)),
                    None => {
                        println!("Server closed the connection.");
                        break;
                    }
                }
            }

            line = stdin.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => client.send_line(&line).await?,
                    None => {
                        debug!("stdin closed");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}
