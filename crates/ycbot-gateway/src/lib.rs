//! ycbot-gateway: routes chat messages to command handling and delivers
//! auto-shutdown reports.

pub mod channel;
pub mod commands;
pub mod format;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ycbot_cron::CycleReport;
use ycbot_types::{InboundMessage, OutboundMessage};

pub use channel::ChannelPlugin;
pub use commands::{BotCommand, CommandHandler};

const INBOUND_BUFFER: usize = 64;

/// One chat channel wired to the command handler.
pub struct Gateway {
    handler: Arc<CommandHandler>,
    channel: Arc<dyn ChannelPlugin>,
    allowed_chats: Vec<i64>,
}

impl Gateway {
    /// `allowed_chats` empty means every chat may talk to the bot.
    pub fn new(
        handler: Arc<CommandHandler>,
        channel: Arc<dyn ChannelPlugin>,
        allowed_chats: Vec<i64>,
    ) -> Self {
        Self {
            handler,
            channel,
            allowed_chats,
        }
    }

    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    /// Start the channel and serve until `cancel` fires or the channel
    /// closes. Stops the channel before returning.
    pub async fn run(
        self,
        mut reports: mpsc::UnboundedReceiver<CycleReport>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let (tx, mut inbound) = mpsc::channel(INBOUND_BUFFER);
        self.channel
            .start(tx)
            .await
            .context("failed to start chat channel")?;
        info!(channel = self.channel.channel_type(), "Gateway started");

        // One queue per chat keeps a chat's messages in arrival order while
        // different chats are served concurrently.
        let mut chats: HashMap<i64, mpsc::UnboundedSender<InboundMessage>> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => {
                    let Some(message) = message else {
                        warn!("Inbound channel closed");
                        break;
                    };
                    if !self.is_allowed(message.chat_id) {
                        warn!(
                            chat_id = message.chat_id,
                            sender = %message.sender_id,
                            "Ignoring message from unauthorized chat"
                        );
                        continue;
                    }
                    let chat_id = message.chat_id;
                    let queue = chats.entry(chat_id).or_insert_with(|| {
                        spawn_chat_worker(self.handler.clone(), self.channel.clone())
                    });
                    if queue.send(message).is_err() {
                        warn!(chat_id, "Chat worker is gone, dropping message");
                        chats.remove(&chat_id);
                    }
                }
                Some(report) = reports.recv() => {
                    let text = format::render_cycle_report(&report);
                    if let Err(e) = self.channel.send(OutboundMessage::plain(report.recipient, text)).await {
                        warn!(chat_id = report.recipient, "Failed to deliver auto-shutdown report: {e}");
                    }
                }
            }
        }

        self.channel.stop().await?;
        info!("Gateway stopped");
        Ok(())
    }
}

fn spawn_chat_worker(
    handler: Arc<CommandHandler>,
    channel: Arc<dyn ChannelPlugin>,
) -> mpsc::UnboundedSender<InboundMessage> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            process_message(&handler, channel.as_ref(), message).await;
        }
    });
    tx
}

async fn process_message(
    handler: &CommandHandler,
    channel: &dyn ChannelPlugin,
    message: InboundMessage,
) {
    info!(
        chat_id = message.chat_id,
        sender = %message.sender_id,
        command = message.command.as_deref().unwrap_or(""),
        "Processing inbound message"
    );

    if let Err(e) = channel.notify_processing(message.chat_id).await {
        debug!(chat_id = message.chat_id, "Typing indicator failed: {e}");
    }

    let reply = handler.handle(&message).await;
    if let Err(e) = channel.send(reply).await {
        warn!(chat_id = message.chat_id, "Failed to send reply: {e}");
    }
}
