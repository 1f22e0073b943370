//! Telegram channel: long-polls the Bot API for messages and button presses.
//!
//! Replies to typed messages are sent as new messages. Replies to button
//! presses replace the text and keyboard of the message that carried the
//! button.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{Channel, EventStream, IncomingEvent, Reply};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Wait after a failed poll when Telegram gives no `retry_after`.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// POST a Bot API method, mapping transport and status failures.
    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let err = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method} returned {status}: {err}"),
        })
    }

    /// Send a reply as new message(s). Long text is split; the keyboard is
    /// attached to the last chunk.
    async fn send_message(&self, chat_id: &str, reply: &Reply) -> Result<(), ChannelError> {
        let chunks = split_message(&reply.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(markup) = inline_keyboard(reply) {
                    body["reply_markup"] = markup;
                }
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    /// Replace the text and keyboard of an earlier bot message.
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i64,
        reply: &Reply,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
        });
        if let Some(markup) = inline_keyboard(reply) {
            body["reply_markup"] = markup;
        }
        self.call("editMessageText", &body).await
    }

    /// Stop the client-side spinner on a pressed button.
    async fn answer_callback(&self, callback_query_id: &str) {
        let body = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Err(e) = self.call("answerCallbackQuery", &body).await {
            tracing::warn!("Telegram answerCallbackQuery failed: {e}");
        }
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let results = match read_updates(&data) {
                    Ok(results) => results,
                    Err(failure) => {
                        tracing::warn!(
                            error_code = ?failure.error_code,
                            description = %failure.description,
                            retry_in = ?failure.retry_after,
                            "Telegram getUpdates rejected"
                        );
                        tokio::time::sleep(failure.retry_after).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(&self, event: &IncomingEvent, reply: Reply) -> Result<(), ChannelError> {
        let chat_id = event
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in event metadata".into(),
            })?;

        if let Some(callback_id) = event
            .metadata
            .get("callback_query_id")
            .and_then(|v| v.as_str())
        {
            self.answer_callback(callback_id).await;
        }

        let message_id = event.metadata.get("message_id").and_then(|v| v.as_i64());
        if let (true, Some(message_id)) = (event.is_button(), message_id) {
            if reply.text.len() <= TELEGRAM_MAX_MESSAGE_LENGTH {
                match self.edit_message(chat_id, message_id, &reply).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!("Telegram edit failed; sending a new message: {e}");
                    }
                }
            }
        }

        self.send_message(chat_id, &reply).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        bot_token.expose_secret()
    )
}

/// A getUpdates response that carried no updates list.
#[derive(Debug, PartialEq)]
struct PollFailure {
    error_code: Option<i64>,
    description: String,
    retry_after: Duration,
}

/// Extract the updates from a getUpdates response, or describe why there are
/// none and how long to wait before polling again.
fn read_updates(data: &serde_json::Value) -> Result<&[serde_json::Value], PollFailure> {
    if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
        return Ok(results);
    }
    let retry_after = data
        .pointer("/parameters/retry_after")
        .and_then(serde_json::Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(POLL_ERROR_BACKOFF);
    Err(PollFailure {
        error_code: data.get("error_code").and_then(serde_json::Value::as_i64),
        description: data
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no result in response")
            .to_string(),
        retry_after,
    })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Turn one getUpdates entry into an event. Returns `None` for updates the
/// bot does not handle and for users outside the allowlist.
fn parse_update(update: &serde_json::Value, allowed_users: &[String]) -> Option<IncomingEvent> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(serde_json::Value::as_str)?;
        let from = message.get("from")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let (user_id, username) = identify(from, allowed_users)?;

        let event = IncomingEvent::from_text("telegram", &user_id, text).with_metadata(
            serde_json::json!({
                "chat_id": chat_id.to_string(),
                "username": username,
            }),
        );
        return Some(with_display_name(event, from, &username));
    }

    if let Some(query) = update.get("callback_query") {
        let callback_id = query.get("id").and_then(serde_json::Value::as_str)?;
        let data = query.get("data").and_then(serde_json::Value::as_str)?;
        let from = query.get("from")?;
        let message = query.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let message_id = message.get("message_id").and_then(serde_json::Value::as_i64);
        let (user_id, username) = identify(from, allowed_users)?;

        let event = IncomingEvent::button("telegram", &user_id, data).with_metadata(
            serde_json::json!({
                "chat_id": chat_id.to_string(),
                "message_id": message_id,
                "callback_query_id": callback_id,
                "username": username,
            }),
        );
        return Some(with_display_name(event, from, &username));
    }

    None
}

/// Extract (numeric user id, username) and apply the allowlist against both.
fn identify(from: &serde_json::Value, allowed_users: &[String]) -> Option<(String, String)> {
    let user_id = from.get("id").and_then(serde_json::Value::as_i64)?.to_string();
    let username = from
        .get("username")
        .and_then(|u| u.as_str())
        .unwrap_or("unknown")
        .to_string();

    if !check_user_allowed(allowed_users, [username.as_str(), user_id.as_str()]) {
        tracing::warn!(
            "Telegram: ignoring update from unauthorized user: username={username}, user_id={user_id}"
        );
        return None;
    }
    Some((user_id, username))
}

fn with_display_name(event: IncomingEvent, from: &serde_json::Value, username: &str) -> IncomingEvent {
    let name = from
        .get("first_name")
        .and_then(|n| n.as_str())
        .unwrap_or(username);
    event.with_user_name(name)
}

/// Render a reply's keyboard as Telegram `InlineKeyboardMarkup`.
fn inline_keyboard(reply: &Reply) -> Option<serde_json::Value> {
    if reply.keyboard.is_empty() {
        return None;
    }
    let rows: Vec<Vec<serde_json::Value>> = reply
        .keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({ "text": b.label, "callback_data": b.payload }))
                .collect()
        })
        .collect();
    Some(serde_json::json!({ "inline_keyboard": rows }))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
