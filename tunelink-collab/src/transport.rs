use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::PrimaryKey;

/// Identifies a message that was sent to a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: PrimaryKey,
    pub message_id: i32,
}

impl MessageRef {
    pub fn new(chat_id: PrimaryKey, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// An audio file to be delivered to a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub path: PathBuf,
    pub title: String,
    pub performer: String,
    /// Duration in seconds
    pub duration: u32,
    pub caption: Option<String>,
    pub thumbnail: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("The chat platform rejected the request: {0}")]
    Rejected(String),
    #[error("Failed to reach the chat platform: {0}")]
    Network(String),
}

/// The chat platform, as seen by the jobs that deliver media.
///
/// Implementations own connection state and are only used from the scheduler that runs jobs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: PrimaryKey, text: &str) -> Result<MessageRef, TransportError>;
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError>;
    async fn delete(&self, message: MessageRef) -> Result<(), TransportError>;
    async fn send_audio(
        &self,
        chat_id: PrimaryKey,
        audio: AudioUpload,
    ) -> Result<MessageRef, TransportError>;
}
