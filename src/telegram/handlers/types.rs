//! Handler types, dependencies, and sender helpers

use std::sync::Arc;

use teloxide::types::{Message, UserId};
use unic_langid::LanguageIdentifier;

use crate::conversation::{Conversation, Sender};
use crate::i18n;
use crate::storage::DbPool;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub conversation: Arc<Conversation>,
    pub db_pool: Arc<DbPool>,
    pub staff_ids: Arc<Vec<i64>>,
    pub bot_username: Option<String>,
    pub bot_id: UserId,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(
        conversation: Arc<Conversation>,
        db_pool: Arc<DbPool>,
        staff_ids: Arc<Vec<i64>>,
        bot_username: Option<String>,
        bot_id: UserId,
    ) -> Self {
        Self {
            conversation,
            db_pool,
            staff_ids,
            bot_username,
            bot_id,
        }
    }
}

/// User and chat ids of a message. Channel posts have no user.
pub fn sender_of(msg: &Message) -> Sender {
    Sender {
        user_id: msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()),
        chat_id: Some(msg.chat.id.0),
    }
}

/// Reply language from the sender's Telegram profile.
pub fn message_lang(msg: &Message) -> LanguageIdentifier {
    i18n::lang_from_telegram(msg.from.as_ref().and_then(|u| u.language_code.as_deref()))
}
