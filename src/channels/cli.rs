//! CLI channel: stdin/stdout REPL for running the wizard locally.
//!
//! Lines starting with `/` are commands, lines starting with `!` press the
//! button whose payload follows, anything else is free text. A leading `!!`
//! sends text that starts with a literal `!`. Buttons are printed as
//! `[Label] !payload`.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, EventStream, IncomingEvent, Reply};
use crate::error::ChannelError;

/// User id for every event read from the terminal.
pub const CLI_USER_ID: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Classify one trimmed, non-empty input line.
fn parse_line(line: &str) -> IncomingEvent {
    if let Some(literal) = line.strip_prefix("!!") {
        return IncomingEvent::from_text("cli", CLI_USER_ID, &format!("!{literal}"));
    }
    match line.strip_prefix('!') {
        Some(payload) if !payload.is_empty() => IncomingEvent::button("cli", CLI_USER_ID, payload),
        _ => IncomingEvent::from_text("cli", CLI_USER_ID, line),
    }
}

/// Render a reply the way it is printed to the terminal.
fn render(reply: &Reply) -> String {
    let mut out = reply.text.clone();
    for row in &reply.keyboard {
        let cells: Vec<String> = row
            .iter()
            .map(|b| format!("[{}] !{}", b.label, b.payload))
            .collect();
        out.push_str("\n  ");
        out.push_str(&cells.join("   "));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

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
                        if tx.send(parse_line(line)).is_err() {
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
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(&self, _event: &IncomingEvent, reply: Reply) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&reply));
        eprint!("> ");
        Ok(())
    }
}
