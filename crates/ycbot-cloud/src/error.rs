//! Error taxonomy for cloud calls.

use std::fmt;

use thiserror::Error;

/// Which call in the cloud hierarchy produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Organizations,
    Clouds,
    Folders,
    Instances,
    Stop,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Organizations => "organizations",
            Self::Clouds => "clouds",
            Self::Folders => "folders",
            Self::Instances => "instances",
            Self::Stop => "stop",
        })
    }
}

#[derive(Debug, Error)]
pub enum CloudError {
    /// The identity endpoint refused or garbled the token exchange.
    #[error("credential exchange failed: {0}")]
    Auth(String),
    /// A listing or stop call returned a non-success status.
    #[error("{stage} request failed with status {status}: {body}")]
    Api {
        stage: Stage,
        status: u16,
        body: String,
    },
    #[error("instance {instance_id} has no `{label}` label")]
    MissingLabel {
        instance_id: String,
        label: &'static str,
    },
    #[error("instance {instance_id} has malformed `{label}` label `{value}`")]
    InvalidLabel {
        instance_id: String,
        label: &'static str,
        value: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type CloudResult<T> = Result<T, CloudError>;
