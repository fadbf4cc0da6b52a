//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Choice sets are printed as a numbered list; typing the number (or the
//! token itself) picks the option.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, Choice, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

const USER_ID: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    /// Choices offered by the last response, shared with the reader task.
    offered: Arc<Mutex<Vec<Choice>>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Turn a typed line into a message, resolving picks by number or token.
fn to_message(line: &str, offered: &[Choice]) -> IncomingMessage {
    let picked = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| offered.get(i))
        .or_else(|| offered.iter().find(|c| c.token == line));
    match picked {
        Some(choice) => IncomingMessage::selection("cli", USER_ID, &choice.token),
        None => IncomingMessage::new("cli", USER_ID, line),
    }
}

fn render(response: &OutgoingResponse) -> String {
    let mut out = response.content.clone();
    for (i, choice) in response.choices.iter().enumerate() {
        out.push_str(&format!("\n  {}. {}", i + 1, choice.label));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let offered = Arc::clone(&self.offered);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = {
                            let offered = offered.lock().unwrap_or_else(|e| e.into_inner());
                            to_message(line, &offered)
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&response));
        *self.offered.lock().unwrap_or_else(|e| e.into_inner()) = response.choices;
        eprint!("> ");
        Ok(())
    }
}
