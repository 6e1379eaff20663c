//! Telegram Bot API payloads used by the webhook and the client.

use serde::{Deserialize, Serialize};

/// Incoming webhook update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Update sequence number
    pub update_id: i64,
    /// New message
    #[serde(default)]
    pub message: Option<Message>,
    /// Inline keyboard button press
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id within the chat
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat: Chat,
    /// Sender
    #[serde(default)]
    pub from: Option<User>,
    /// Text, if any
    #[serde(default)]
    pub text: Option<String>,
}

/// A Telegram chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A Telegram user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: i64,
    /// First name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Username without `@`
    #[serde(default)]
    pub username: Option<String>,
}

/// Inline keyboard callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Callback id, answered with `answerCallbackQuery`
    pub id: String,
    /// User who pressed the button
    pub from: User,
    /// Message carrying the keyboard
    #[serde(default)]
    pub message: Option<Message>,
    /// Button payload
    #[serde(default)]
    pub data: Option<String>,
}

/// Inline keyboard attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    /// Rows of buttons
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// One inline keyboard button.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    /// Label
    pub text: String,
    /// Payload sent back as `CallbackQuery::data`
    pub callback_data: String,
}

/// An outgoing `sendMessage` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target chat
    pub chat_id: i64,
    /// Message text (HTML parse mode)
    pub text: String,
    /// Optional inline keyboard
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl OutgoingMessage {
    /// Plain text message
    #[must_use]
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_markup: None,
        }
    }

    /// Message with an inline keyboard
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.reply_markup = Some(keyboard);
        self
    }
}
