//! Telegram Bot channel for ycbot.
//!
//! Uses Telegram Bot API with long-polling (no webhook required). The bot
//! token comes from the `BOT_TOKEN` environment variable.

pub mod api;
pub mod polling;
pub mod types;

use std::sync::Arc;

use anyhow::bail;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ycbot_gateway::BotCommand;
use ycbot_types::{ChannelStatus, InboundMessage, OutboundMessage};

use api::TelegramApi;
use types::{MenuCommand, SendChatActionParams, SendMessageParams, SetMyCommandsParams};

/// Telegram rejects messages longer than 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Telegram channel implementing `ChannelPlugin`.
pub struct TelegramChannel {
    api: Arc<TelegramApi>,
    state: Mutex<TelegramState>,
}

struct TelegramState {
    status: ChannelStatus,
    cancel: Option<CancellationToken>,
    poll_handle: Option<JoinHandle<()>>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Ok(Self::with_api(TelegramApi::new(bot_token)?))
    }

    pub fn with_api(api: TelegramApi) -> Self {
        Self {
            api: Arc::new(api),
            state: Mutex::new(TelegramState {
                status: ChannelStatus::Stopped,
                cancel: None,
                poll_handle: None,
            }),
        }
    }

    async fn register_commands(&self) {
        let params = SetMyCommandsParams {
            commands: BotCommand::ALL
                .iter()
                .map(|c| MenuCommand {
                    command: c.name().into(),
                    description: c.description().into(),
                })
                .collect(),
        };
        if let Err(e) = self.api.set_my_commands(&params).await {
            warn!("Failed to register bot commands: {e}");
        }
    }

    /// Send one chunk, retrying as plain text if Markdown is rejected.
    async fn send_chunk(&self, chat_id: i64, text: String, markdown: bool) -> anyhow::Result<()> {
        if markdown {
            let result = self
                .api
                .send_message(&SendMessageParams {
                    chat_id,
                    text: text.clone(),
                    parse_mode: Some("Markdown".into()),
                })
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(e) => debug!(chat_id, "Markdown send rejected, retrying as plain text: {e}"),
            }
        }

        self.api
            .send_message(&SendMessageParams {
                chat_id,
                text,
                parse_mode: None,
            })
            .await?;
        Ok(())
    }
}

/// Split `text` into chunks of at most `limit` characters, preferring line
/// breaks. Lines longer than `limit` are cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        for ch in line.chars() {
            if current_len == limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(ch);
            current_len += 1;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait::async_trait]
impl ycbot_gateway::channel::ChannelPlugin for TelegramChannel {
    fn channel_type(&self) -> &str {
        "telegram"
    }

    async fn start(&self, sender: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.status == ChannelStatus::Running {
            bail!("Telegram channel is already running");
        }

        state.status = ChannelStatus::Starting;

        // Verify bot token
        match self.api.get_me().await {
            Ok(bot) => {
                info!(
                    bot_username = bot.username.as_deref().unwrap_or("unknown"),
                    "Telegram bot authenticated"
                );
            }
            Err(e) => {
                state.status = ChannelStatus::Error(format!("Auth failed: {e}"));
                bail!("Failed to authenticate Telegram bot: {e}");
            }
        }

        self.register_commands().await;

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let api = self.api.clone();

        let handle = tokio::spawn(async move {
            polling::run_polling_loop(&api, sender, cancel_child).await;
        });

        state.cancel = Some(cancel);
        state.poll_handle = Some(handle);
        state.status = ChannelStatus::Running;

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = state.poll_handle.take() {
            let _ = handle.await;
        }

        state.status = ChannelStatus::Stopped;
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let chunks = split_message(&message.text, MAX_MESSAGE_CHARS);
        if chunks.is_empty() {
            debug!(chat_id = message.chat_id, "Skipping empty message");
        }
        for chunk in chunks {
            self.send_chunk(message.chat_id, chunk, message.markdown)
                .await?;
        }
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        match self.state.try_lock() {
            Ok(state) => state.status.clone(),
            Err(_) => ChannelStatus::Starting,
        }
    }

    async fn notify_processing(&self, chat_id: i64) -> anyhow::Result<()> {
        self.api
            .send_chat_action(&SendChatActionParams {
                chat_id,
                action: "typing".into(),
            })
            .await
    }
}
