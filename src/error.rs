use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors the channel adapter can surface when talking to the worker.
#[derive(Error, Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub enum ChannelError {
    /// The command could not be handed to the transport at all.
    #[error("send failed: {0}")]
    Send(String),

    /// The transport accepted the command but reported a failure instead of an ack.
    #[error("worker rejected command: {0}")]
    Nack(String),

    /// Anything else the transport reports.
    #[error("channel error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> ChannelError {
        ChannelError::Other(err.to_string())
    }
}

/// Errors raised before a command is allowed onto the channel.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DispatchError {
    /// A command without a usable job identifier can never be correlated
    /// back, so it is rejected before send.
    #[error("command has no usable job identifier")]
    MissingIdentifier,
}
