//! Request and response shapes for the Telegram Bot HTTP API.
//!
//! Only the two calls the node needs are covered; both back ends bring their
//! own HTTP client.

use serde::{Deserialize, Serialize};

use crate::{cycle::TransportError, types::InboundMessage};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBatch {
    pub messages: Vec<InboundMessage>,
    /// Offset that acknowledges everything in this batch, if it was non-empty.
    pub next_offset: Option<i64>,
}

pub fn send_message_url(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

/// `timeout=0` keeps the poll short so the node can go back to sleep.
pub fn get_updates_url(api_base: &str, token: &str, offset: Option<i64>) -> String {
    let base = format!("{}/bot{}/getUpdates?timeout=0", api_base.trim_end_matches('/'), token);
    match offset {
        Some(offset) => format!("{base}&offset={offset}"),
        None => base,
    }
}

/// Telegram forgets updates below `offset` once it is sent back; the limit
/// keeps the acknowledging call from pulling a fresh batch.
pub fn acknowledge_url(api_base: &str, token: &str, offset: i64) -> String {
    format!("{}&limit=1", get_updates_url(api_base, token, Some(offset)))
}

pub fn parse_updates(body: &[u8]) -> Result<UpdateBatch, TransportError> {
    let response: ApiResponse<Vec<Update>> = serde_json::from_slice(body)
        .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;

    if !response.ok {
        return Err(TransportError::Rejected(
            response
                .description
                .unwrap_or_else(|| "getUpdates not ok".to_string()),
        ));
    }

    let updates = response.result.unwrap_or_default();
    let next_offset = updates.iter().map(|update| update.update_id + 1).max();
    let messages = updates
        .into_iter()
        .filter_map(|update| {
            let message = update.message?;
            Some(InboundMessage {
                sender_id: message.chat.id.to_string(),
                text: message.text?,
            })
        })
        .collect();

    Ok(UpdateBatch {
        messages,
        next_offset,
    })
}

pub fn check_send_response(body: &[u8]) -> Result<(), TransportError> {
    let response: ApiResponse<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;

    if response.ok {
        Ok(())
    } else {
        Err(TransportError::Rejected(
            response
                .description
                .unwrap_or_else(|| "sendMessage not ok".to_string()),
        ))
    }
}
