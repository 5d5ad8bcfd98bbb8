//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod staff;

// Re-exports for convenience
pub use bot::{create_bot, is_message_addressed_to_bot, setup_bot_commands, strip_bot_mention, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use teloxide::Bot;
