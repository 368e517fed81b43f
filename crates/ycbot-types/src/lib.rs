use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ──────────────────── Inventory Types ────────────────────

/// Run state of a compute instance as reported by the cloud.
///
/// Only `Running` matters for shutdown decisions; every other state the
/// provider may report is kept verbatim so it can be shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Running,
    Stopped,
    Other(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "RUNNING" => Self::Running,
            "STOPPED" => Self::Stopped,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<InstanceStatus> for String {
    fn from(value: InstanceStatus) -> Self {
        match value {
            InstanceStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf compute instance together with its expiration label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Provider instance ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current run state.
    pub status: InstanceStatus,
    /// Calendar day on which the instance is due to be stopped.
    pub expires_on: NaiveDate,
}

/// A folder (sub-unit) and the instances it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub instances: Vec<Resource>,
}

/// A cloud (top-level unit) and its folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloud {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// A complete cloud → folder → instance snapshot taken by a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub clouds: Vec<Cloud>,
}

impl Inventory {
    /// Iterate over every instance in the snapshot, depth first.
    pub fn instances(&self) -> impl Iterator<Item = &Resource> {
        self.clouds
            .iter()
            .flat_map(|cloud| cloud.folders.iter())
            .flat_map(|folder| folder.instances.iter())
    }

    /// Number of instances across all clouds and folders.
    pub fn instance_count(&self) -> usize {
        self.instances().count()
    }
}

/// The organization the credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

// ──────────────────── Channel Types ────────────────────

/// Message from the chat platform to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Chat the message was posted in; replies go back here.
    pub chat_id: i64,
    /// Platform message ID.
    pub message_id: i64,
    /// External user identifier.
    pub sender_id: String,
    /// Display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    /// Bot command name without the leading slash, if the message is a command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Message timestamp (unix millis).
    pub timestamp: i64,
}

impl InboundMessage {
    /// Build a plain-text message, mainly for tests and local tooling.
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id: 0,
            sender_id: chat_id.to_string(),
            sender_name: None,
            text: text.into(),
            command: None,
            timestamp: 0,
        }
    }

    /// Build a command message (`/name`).
    pub fn command(chat_id: i64, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::text(chat_id, format!("/{command}"))
        }
    }
}

/// Message from the bot to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target chat.
    pub chat_id: i64,
    /// Response text content.
    pub text: String,
    /// Whether `text` uses Markdown markup.
    #[serde(default)]
    pub markdown: bool,
}

impl OutboundMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markdown: false,
        }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markdown: true,
        }
    }
}

/// Status of a channel plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Channel is not running.
    Stopped,
    /// Channel is initializing.
    Starting,
    /// Channel is running and accepting messages.
    Running,
    /// Channel encountered an error.
    Error(String),
}
