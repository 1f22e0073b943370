//! Channel trait and the event/reply types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound events produced by a started channel.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// A slash command understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    NewSignal,
    ManagePresets,
    Other(String),
}

impl Command {
    /// Parse `/name`, `/name@botname` or `/name args`. Returns `None` when
    /// `text` is not a command at all.
    pub fn parse(text: &str) -> Option<Command> {
        let rest = text.trim_start().strip_prefix('/')?;
        let token = rest.split(char::is_whitespace).next().unwrap_or("");
        let name = token.split('@').next().unwrap_or("");
        if name.is_empty() {
            return None;
        }
        Some(match name {
            "start" => Command::Start,
            "newsignal" => Command::NewSignal,
            "managepresets" => Command::ManagePresets,
            other => Command::Other(other.to_string()),
        })
    }
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Text(String),
    /// A button press carrying its opaque payload.
    Button(String),
}

/// An inbound event from any channel.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub channel: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub kind: EventKind,
    /// Channel-specific routing data (chat id, message id, …).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingEvent {
    pub fn new(channel: &str, user_id: &str, kind: EventKind) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            kind,
            metadata: serde_json::json!({}),
            received_at: Utc::now(),
        }
    }

    /// Classify a typed message as a command or free text.
    pub fn from_text(channel: &str, user_id: &str, text: &str) -> Self {
        let kind = match Command::parse(text) {
            Some(command) => EventKind::Command(command),
            None => EventKind::Text(text.to_string()),
        };
        Self::new(channel, user_id, kind)
    }

    pub fn button(channel: &str, user_id: &str, payload: &str) -> Self {
        Self::new(channel, user_id, EventKind::Button(payload.to_string()))
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn is_button(&self) -> bool {
        matches!(self.kind, EventKind::Button(_))
    }
}

/// A labeled button with the payload it sends back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

/// Text reply with an optional grid of buttons (rows of columns).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.keyboard.push(row);
        }
        self
    }

    /// Every button payload, row by row.
    pub fn payloads(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flatten()
            .map(|b| b.payload.as_str())
            .collect()
    }
}

/// A chat transport the bot can run on.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Render `reply` back to wherever `event` came from.
    async fn respond(&self, event: &IncomingEvent, reply: Reply) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/newsignal"), Some(Command::NewSignal));
        assert_eq!(
            Command::parse("/managepresets extra args"),
            Some(Command::ManagePresets)
        );
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(
            Command::parse("/newsignal@signal_bot"),
            Some(Command::NewSignal)
        );
    }

    #[test]
    fn unknown_commands_are_kept() {
        assert_eq!(
            Command::parse("/help"),
            Some(Command::Other("help".into()))
        );
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(Command::parse("BTCUSD"), None);
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse("/ start"), None);
    }

    #[test]
    fn from_text_classifies() {
        let ev = IncomingEvent::from_text("cli", "u", "/start");
        assert_eq!(ev.kind, EventKind::Command(Command::Start));
        let ev = IncomingEvent::from_text("cli", "u", "long");
        assert_eq!(ev.kind, EventKind::Text("long".into()));
        assert!(!ev.is_button());
    }

    #[test]
    fn reply_skips_empty_rows() {
        let reply = Reply::text("hi").with_row(vec![]).with_row(vec![Button {
            label: "A".into(),
            payload: "a".into(),
        }]);
        assert_eq!(reply.keyboard.len(), 1);
        assert_eq!(reply.payloads(), vec!["a"]);
    }
}
