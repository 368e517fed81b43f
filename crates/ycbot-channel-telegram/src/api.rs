//! Telegram Bot API HTTP client.

use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{
    ApiResponse, BotInfo, GetUpdatesParams, SendChatActionParams, SendMessageParams,
    SetMyCommandsParams, TgMessage, Update,
};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Longer than the `getUpdates` long-poll timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the Telegram Bot API.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client with the given bot token.
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_API_URL, bot_token)
    }

    /// Client against a different API host, e.g. a local Bot API server.
    pub fn with_base_url(api_url: &str, bot_token: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{bot_token}", api_url.trim_end_matches('/')),
        })
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> anyhow::Result<ApiResponse<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp: ApiResponse<T> = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .json()
            .await
            .with_context(|| format!("{method} response parse failed"))?;

        if !resp.ok {
            bail!("{method} failed: {}", resp.failure());
        }
        Ok(resp)
    }

    /// Verify the bot token by calling `getMe`.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        let resp: ApiResponse<BotInfo> = self.call("getMe", &serde_json::json!({})).await?;
        resp.result.context("getMe returned no result")
    }

    /// Long-poll for updates.
    pub async fn get_updates(&self, params: &GetUpdatesParams) -> anyhow::Result<Vec<Update>> {
        let resp: ApiResponse<Vec<Update>> = self.call("getUpdates", params).await?;
        Ok(resp.result.unwrap_or_default())
    }

    /// Send a chat action (e.g. "typing").
    pub async fn send_chat_action(&self, params: &SendChatActionParams) -> anyhow::Result<()> {
        let _: ApiResponse<bool> = self.call("sendChatAction", params).await?;
        Ok(())
    }

    /// Register bot commands in the menu.
    pub async fn set_my_commands(&self, params: &SetMyCommandsParams) -> anyhow::Result<()> {
        let _: ApiResponse<bool> = self.call("setMyCommands", params).await?;
        Ok(())
    }

    /// Send a text message.
    pub async fn send_message(&self, params: &SendMessageParams) -> anyhow::Result<TgMessage> {
        let resp: ApiResponse<TgMessage> = self.call("sendMessage", params).await?;
        resp.result.context("sendMessage returned no result")
    }
}
