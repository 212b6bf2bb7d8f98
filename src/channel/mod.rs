use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ChannelError;
use crate::message::{CommandMessage, StatusMessage};

pub mod test_util;

/// The engine's only view of the transport to the privileged worker.
///
/// `send_command` resolves with the worker's direct ack (or a channel
/// failure); everything else the worker says arrives as unsolicited
/// broadcasts on the subscription. Both directions are best-effort and
/// unordered: messages can be lost, duplicated, or stripped of their
/// identifiers by the serialization boundary, and the engine is written to
/// survive all three.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Adapter name, for logs.
    fn name(&self) -> String;

    async fn send_command(&self, msg: CommandMessage) -> Result<StatusMessage, ChannelError>;

    /// Subscribe to unsolicited status broadcasts. Each call returns an
    /// independent receiver; slow consumers may observe `Lagged`.
    fn subscribe(&self) -> broadcast::Receiver<StatusMessage>;
}
