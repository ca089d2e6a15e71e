use async_trait::async_trait;
use teloxide::{
    payloads::setters::*,
    prelude::*,
    types::{InputFile, MessageId},
    RequestError,
};
use tunelink_collab::{AudioUpload, MessageRef, PrimaryKey, Transport, TransportError};

/// Delivers job output through the Telegram bot API
#[derive(Clone)]
pub struct TeloxideTransport {
    bot: Bot,
}

impl TeloxideTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn to_ref(message: &Message) -> MessageRef {
    MessageRef::new(message.chat.id.0, message.id.0)
}

fn transport_error(error: RequestError) -> TransportError {
    match error {
        RequestError::Api(e) => TransportError::Rejected(e.to_string()),
        RequestError::MigrateToChatId(id) => {
            TransportError::Rejected(format!("Chat migrated to {:?}", id))
        }
        RequestError::RetryAfter(after) => {
            TransportError::Rejected(format!("Rate limited for {:?}", after))
        }
        e => TransportError::Network(e.to_string()),
    }
}

#[async_trait]
impl Transport for TeloxideTransport {
    async fn send_text(&self, chat_id: PrimaryKey, text: &str) -> Result<MessageRef, TransportError> {
        let message = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(transport_error)?;

        Ok(to_ref(&message))
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        self.bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
            .await
            .map_err(transport_error)?;

        Ok(())
    }

    async fn delete(&self, message: MessageRef) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await
            .map_err(transport_error)?;

        Ok(())
    }

    async fn send_audio(
        &self,
        chat_id: PrimaryKey,
        audio: AudioUpload,
    ) -> Result<MessageRef, TransportError> {
        let mut request = self
            .bot
            .send_audio(ChatId(chat_id), InputFile::file(audio.path))
            .title(audio.title)
            .performer(audio.performer)
            .duration(audio.duration);

        if let Some(caption) = audio.caption {
            request = request.caption(caption);
        }

        if let Some(thumbnail) = audio.thumbnail {
            request = request.thumb(InputFile::file(thumbnail));
        }

        let message = request.await.map_err(transport_error)?;
        Ok(to_ref(&message))
    }
}
