//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages arrive as free text; taps on inline keyboard buttons
//! arrive as `callback_query` updates and become selections.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{Channel, Choice, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Connects to the Bot API via long-polling.
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
        format!("{API_BASE}/bot{}/{method}", self.bot_token.expose_secret())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))
    }

    /// Drop any registered webhook so long-polling is not refused with 409.
    async fn delete_webhook(&self) {
        match self.post("deleteWebhook", &delete_webhook_body()).await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Telegram webhook cleared");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Telegram deleteWebhook failed");
            }
            Err(e) => tracing::warn!("Telegram deleteWebhook failed: {e}"),
        }
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages; the keyboard rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        choices: &[Choice],
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = (i == last && !choices.is_empty()).then(|| inline_keyboard(choices));
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }

        let markdown_resp = self.post("sendMessage", &body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        if let Some(obj) = body.as_object_mut() {
            obj.remove("parse_mode");
        }
        let plain_resp = self.post("sendMessage", &body).await?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }

    /// Replace the text of the message that carried the keyboard.
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        let resp = self.post("editMessageText", &body).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("editMessageText returned {}", resp.status()),
            })
        }
    }

    /// Stop the client-side spinner on a tapped button.
    async fn answer_callback(&self, callback_query_id: &str) {
        let body = json!({ "callback_query_id": callback_query_id });
        match self.post("answerCallbackQuery", &body).await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = ?resp.status(), "answerCallbackQuery rejected");
            }
            Err(e) => tracing::warn!("answerCallbackQuery failed: {e}"),
            Ok(_) => {}
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        self.delete_webhook().await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    let description = api_description(&data);
                    tracing::warn!(description, "Telegram getUpdates returned no result");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        if let Some(cq) = msg.metadata.get("callback_query_id").and_then(Value::as_str) {
            self.answer_callback(cq).await;
        }

        let keyboard_message = msg.metadata.get("message_id").and_then(Value::as_i64);
        if let (true, true, Some(message_id)) =
            (msg.is_selection(), response.choices.is_empty(), keyboard_message)
        {
            match self.edit_message(chat_id, message_id, &response.content).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!("Falling back to sendMessage: {e}"),
            }
        }

        self.send_message(chat_id, &response.content, &response.choices)
            .await
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

fn delete_webhook_body() -> Value {
    json!({ "drop_pending_updates": true })
}

/// The `description` of a failed Bot API reply, or an empty string.
fn api_description(data: &Value) -> &str {
    data.get("description").and_then(Value::as_str).unwrap_or_default()
}

/// Turn one `getUpdates` entry into a message, dropping anything that is
/// not text or a button tap, or that comes from a user not on the list.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let (from, chat, text, selection, extra) = if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        (message.get("from")?, message.get("chat")?, text, None, json!({}))
    } else if let Some(cq) = update.get("callback_query") {
        let data = cq.get("data").and_then(Value::as_str)?;
        let message = cq.get("message")?;
        let extra = json!({
            "callback_query_id": cq.get("id").and_then(Value::as_str).unwrap_or_default(),
            "message_id": message.get("message_id").and_then(Value::as_i64),
        });
        (cq.get("from")?, message.get("chat")?, data, Some(data), extra)
    } else {
        return None;
    };

    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from.get("id").and_then(Value::as_i64).map(|id| id.to_string());

    // Check allowlist against both username and numeric ID
    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring update from unauthorized user: \
             username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = chat
        .get("id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let sender = user_id.as_deref().unwrap_or(username);
    let incoming = match selection {
        Some(token) => IncomingMessage::selection("telegram", sender, token),
        None => IncomingMessage::new("telegram", sender, text),
    };

    let mut metadata = json!({
        "chat_id": chat_id,
        "username": username,
    });
    if let (Some(meta), Some(extra)) = (metadata.as_object_mut(), extra.as_object()) {
        meta.extend(extra.clone());
    }

    let first_name = from.get("first_name").and_then(Value::as_str);
    Some(
        incoming
            .with_metadata(metadata)
            .with_user_name(first_name.unwrap_or(username)),
    )
}

/// One button per row; the token comes back as callback data.
fn inline_keyboard(choices: &[Choice]) -> Value {
    let rows: Vec<Value> = choices
        .iter()
        .map(|c| json!([{ "text": c.label, "callback_data": c.token }]))
        .collect();
    json!({ "inline_keyboard": rows })
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

/// Split a message into chunks of at most `max_len` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_len) {
            Some((byte, _)) => byte,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(token: &str, allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from(token.to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn wildcard() -> Vec<String> {
        vec!["*".into()]
    }

    // ── Basic channel tests ─────────────────────────────────────────

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel("fake-token", &["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel("123:ABC", &[]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn delete_webhook_drops_pending_updates() {
        assert_eq!(
            channel("123:ABC", &[]).api_url("deleteWebhook"),
            "https://api.telegram.org/bot123:ABC/deleteWebhook"
        );
        assert_eq!(delete_webhook_body()["drop_pending_updates"], json!(true));
    }

    #[test]
    fn api_description_of_conflict() {
        let data = json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: can't use getUpdates method while webhook is active"
        });
        assert!(api_description(&data).starts_with("Conflict"));
        assert_eq!(api_description(&json!({ "ok": false })), "");
    }

    // ── User allowlist tests ────────────────────────────────────────

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(check_user_allowed(&users(&["*"]), ["anyone"]));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let allowed = users(&["alice", "bob"]);
        assert!(check_user_allowed(&allowed, ["alice"]));
        assert!(!check_user_allowed(&allowed, ["eve"]));
    }

    #[test]
    fn telegram_user_denied_empty() {
        assert!(!check_user_allowed(&users(&[]), ["anyone"]));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let allowed = users(&["alice"]);
        assert!(!check_user_allowed(&allowed, ["alice_bot"]));
        assert!(!check_user_allowed(&allowed, ["malice"]));
        assert!(!check_user_allowed(&allowed, [""]));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        let allowed = users(&["123456789"]);
        assert!(check_user_allowed(&allowed, ["unknown", "123456789"]));
        assert!(!check_user_allowed(&allowed, ["unknown", "987"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_text_message() {
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": {"id": 42, "username": "nurse", "first_name": "Анна"},
                "chat": {"id": 4242},
                "text": "/start"
            }
        });
        let msg = parse_update(&update, &wildcard()).unwrap();
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "/start");
        assert!(!msg.is_selection());
        assert_eq!(msg.user_name.as_deref(), Some("Анна"));
        assert_eq!(msg.metadata["chat_id"], "4242");
        assert!(msg.metadata.get("callback_query_id").is_none());
    }

    #[test]
    fn parse_callback_query_as_selection() {
        let update = json!({
            "update_id": 2,
            "callback_query": {
                "id": "cq-1",
                "from": {"id": 42, "username": "nurse"},
                "data": "dp3",
                "message": {"message_id": 77, "chat": {"id": 4242}}
            }
        });
        let msg = parse_update(&update, &wildcard()).unwrap();
        assert_eq!(msg.selection.as_deref(), Some("dp3"));
        assert_eq!(msg.metadata["chat_id"], "4242");
        assert_eq!(msg.metadata["callback_query_id"], "cq-1");
        assert_eq!(msg.metadata["message_id"], 77);
    }

    #[test]
    fn parse_skips_non_text_and_unauthorized() {
        let sticker = json!({
            "update_id": 3,
            "message": {"from": {"id": 1}, "chat": {"id": 1}, "sticker": {}}
        });
        assert!(parse_update(&sticker, &wildcard()).is_none());

        let stranger = json!({
            "update_id": 4,
            "message": {"from": {"id": 1, "username": "eve"}, "chat": {"id": 1}, "text": "hi"}
        });
        assert!(parse_update(&stranger, &["alice".to_string()]).is_none());

        let edited = json!({"update_id": 5, "edited_message": {}});
        assert!(parse_update(&edited, &wildcard()).is_none());
    }

    #[test]
    fn keyboard_has_one_button_per_row() {
        let kb = inline_keyboard(&[Choice::new("Мужской", "male"), Choice::new("Женский", "female")]);
        let rows = kb["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0]["text"], "Женский");
        assert_eq!(rows[1][0]["callback_data"], "female");
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_over_limit_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_counts_cyrillic_by_char() {
        let msg = "я".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }

    // ── Respond extracts chat_id from metadata ──────────────────────

    #[tokio::test]
    async fn respond_without_chat_id_fails() {
        let ch = channel("t", &["*"]);
        let msg = IncomingMessage::new("telegram", "user123", "hello");
        let err = ch
            .respond(&msg, OutgoingResponse::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }
}
