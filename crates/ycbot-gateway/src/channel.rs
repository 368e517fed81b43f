//! Chat platform boundary.
//!
//! ```text
//! Chat platform
//!     ↓ (platform-specific protocol)
//! ChannelPlugin::start() spawns listener
//!     ↓ (InboundMessage via mpsc)
//! Gateway → CommandHandler::handle()
//!     ↓ (reply text)
//! ChannelPlugin::send(OutboundMessage)
//!     ↓ (platform-specific protocol)
//! Chat platform
//! ```

use tokio::sync::mpsc;

use ycbot_types::{ChannelStatus, InboundMessage, OutboundMessage};

/// A chat platform the bot listens on and replies through.
///
/// Use `&self` for all methods; implementations should use interior
/// mutability for any mutable state.
#[async_trait::async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Returns the channel type identifier (e.g. "telegram").
    fn channel_type(&self) -> &str;

    /// Start listening. Incoming messages are pushed into `sender`.
    async fn start(&self, sender: mpsc::Sender<InboundMessage>) -> anyhow::Result<()>;

    /// Stop listening and wait for the listener to exit.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver one message.
    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()>;

    fn status(&self) -> ChannelStatus;

    /// Show a "working on it" indicator in `chat_id`, if the platform has one.
    async fn notify_processing(&self, _chat_id: i64) -> anyhow::Result<()> {
        Ok(())
    }
}
