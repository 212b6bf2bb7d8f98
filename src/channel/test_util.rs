use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::channel::ChannelAdapter;
use crate::error::ChannelError;
use crate::message::{CommandMessage, StatusMessage};

/// How the mock answers `send_command`.
#[derive(Debug, Clone)]
pub enum AckMode {
    /// Reply with this status message (default: an empty bare ack).
    Ack(StatusMessage),
    /// Fail the send.
    Fail(String),
    /// Never resolve, as if the worker went away mid-command.
    Swallow,
}

/// In-memory channel adapter for tests: records every command, answers acks
/// according to a scriptable [`AckMode`], and lets tests inject unsolicited
/// worker broadcasts.
pub struct MockChannel {
    sent: Mutex<Vec<CommandMessage>>,
    ack_mode: Mutex<AckMode>,
    broadcast_tx: broadcast::Sender<StatusMessage>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        let (broadcast_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            sent: Mutex::new(vec![]),
            ack_mode: Mutex::new(AckMode::Ack(StatusMessage::default())),
            broadcast_tx,
        })
    }

    /// Script the reply for subsequent `send_command` calls.
    pub async fn set_ack_mode(&self, mode: AckMode) {
        *self.ack_mode.lock().await = mode;
    }

    /// Inject an unsolicited worker broadcast.
    pub fn inject(&self, msg: StatusMessage) {
        let _ = self.broadcast_tx.send(msg);
    }

    pub async fn sent_messages(&self) -> Vec<CommandMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn last_sent(&self) -> Option<CommandMessage> {
        self.sent.lock().await.last().cloned()
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn name(&self) -> String {
        "mock".to_string()
    }

    async fn send_command(&self, msg: CommandMessage) -> Result<StatusMessage, ChannelError> {
        self.sent.lock().await.push(msg);
        let mode = self.ack_mode.lock().await.clone();
        match mode {
            AckMode::Ack(ack) => Ok(ack),
            AckMode::Fail(reason) => Err(ChannelError::Send(reason)),
            AckMode::Swallow => std::future::pending().await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.broadcast_tx.subscribe()
    }
}
