//! Telegram long-polling loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ycbot_types::InboundMessage;

use crate::api::TelegramApi;
use crate::types::{GetUpdatesParams, MessageEntity, TgMessage};

/// Command name from a message that starts with a bot command entity.
///
/// `/help` → `help`, `/help@somebot args` → `help`.
pub fn command_name(text: &str, entities: &[MessageEntity]) -> Option<String> {
    let is_command = entities
        .iter()
        .any(|e| e.entity_type == "bot_command" && e.offset == 0);
    if !is_command {
        return None;
    }
    let name = text
        .split_whitespace()
        .next()?
        .trim_start_matches('/')
        .split('@')
        .next()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Convert a Telegram message. Non-text messages are skipped.
pub fn to_inbound(msg: TgMessage) -> Option<InboundMessage> {
    let text = msg.text?;
    let sender_id = msg
        .from
        .as_ref()
        .map(|u| u.id.to_string())
        .unwrap_or_else(|| msg.chat.id.to_string());
    let sender_name = msg.from.as_ref().map(|u| u.display_name());
    let command = command_name(&text, &msg.entities);

    Some(InboundMessage {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        sender_id,
        sender_name,
        text,
        command,
        timestamp: msg.date * 1000,
    })
}

/// Run the long-polling loop, converting Telegram updates to `InboundMessage`.
///
/// Exits when `cancel` is cancelled or the `sender` is closed.
pub async fn run_polling_loop(
    api: &TelegramApi,
    sender: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!("Telegram polling loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = GetUpdatesParams {
            offset,
            timeout: Some(30),
            allowed_updates: Some(vec!["message".into()]),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => result,
        };

        match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);

                for update in updates {
                    offset = Some(update.update_id + 1);

                    let Some(inbound) = update.message.and_then(to_inbound) else {
                        continue;
                    };

                    debug!(
                        update_id = update.update_id,
                        chat_id = inbound.chat_id,
                        "Forwarding Telegram message"
                    );

                    if sender.send(inbound).await.is_err() {
                        info!("Inbound channel closed, stopping polling");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "getUpdates error: {e}");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {},
                }

                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    info!("Telegram polling loop stopped");
}
