//! Bot initialization and message routing utilities
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Message addressing logic (private chats, mentions, replies)

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::{ChatKind, Message, MessageEntityKind, UserId};
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
///
/// Staff commands are hidden from the command menu; they take their
/// arguments as one raw string that `staff::StaffCommand` parses.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Puedo ayudarte con:")]
pub enum Command {
    #[command(description = "mensaje de bienvenida")]
    Start,
    #[command(description = "mostrar la ayuda")]
    Ayuda,
    #[command(description = "agendar una cita en el taller")]
    Agendar,
    #[command(description = "cancelar la cita en curso")]
    Cancelar,
    #[command(description = "ver el estado de tus trabajos")]
    MisTrabajos,
    #[command(hide)]
    Trabajos(String),
    #[command(hide)]
    Estado(String),
    #[command(hide)]
    SetEstado(String),
    #[command(hide)]
    Progreso(String),
    #[command(hide)]
    Nota(String),
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (missing token, invalid URL)
pub fn create_bot() -> anyhow::Result<Bot> {
    if config::BOT_TOKEN.is_empty() {
        anyhow::bail!("BOT_TOKEN (or TELOXIDE_TOKEN) is not set");
    }

    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = Bot::with_client(config::BOT_TOKEN.as_str(), client);

    let bot = match config::BOT_API_URL.as_deref() {
        Some(bot_api_url) => {
            log::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };

    Ok(bot)
}

/// Sets up the public bot commands in Telegram UI
///
/// # Returns
/// * `Ok(())` - Commands set successfully
/// * `Err(RequestError)` - Failed to set commands
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}

/// Checks if a message is addressed to the bot
///
/// # Arguments
/// * `msg` - Message to check
/// * `bot_username` - Bot's username (without @)
/// * `bot_id` - Bot's user ID
///
/// # Returns
/// * `true` if message is addressed to bot (private chat, bot mention, reply to bot message)
/// * `false` if message is not addressed to bot
pub fn is_message_addressed_to_bot(msg: &Message, bot_username: Option<&str>, bot_id: UserId) -> bool {
    // In private chats, all messages are addressed to the bot
    if matches!(msg.chat.kind, ChatKind::Private(_)) {
        return true;
    }

    if let Some(from) = msg.reply_to_message().and_then(|reply| reply.from.as_ref()) {
        if from.id == bot_id {
            return true;
        }
    }

    let (Some(text), Some(username)) = (msg.text(), bot_username) else {
        return false;
    };

    let mentioned = msg.parse_entities().unwrap_or_default().iter().any(|entity| {
        matches!(entity.kind(), MessageEntityKind::Mention)
            && entity
                .text()
                .strip_prefix('@')
                .is_some_and(|mention| mention.eq_ignore_ascii_case(username))
    });

    mentioned || text.contains(&format!("@{}", username))
}

/// Removes a leading or trailing `@bot_username` mention from group input
///
/// Mentions in the middle of the text are kept, they are part of the answer.
pub fn strip_bot_mention<'a>(text: &'a str, bot_username: Option<&str>) -> &'a str {
    let text = text.trim();
    let Some(username) = bot_username.filter(|u| !u.is_empty()) else {
        return text;
    };
    let mention_len = username.len() + 1;
    let is_mention = |candidate: &str| {
        candidate
            .strip_prefix('@')
            .is_some_and(|name| name.eq_ignore_ascii_case(username))
    };

    let mut rest = text;
    if let Some(head) = rest.get(..mention_len) {
        let tail = &rest[mention_len..];
        let at_boundary = tail.chars().next().map_or(true, |c| c.is_whitespace() || c == ',' || c == ':');
        if is_mention(head) && at_boundary {
            rest = tail.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ':');
        }
    }
    if let Some(split) = rest.len().checked_sub(mention_len) {
        if let (Some(head), Some(tail)) = (rest.get(..split), rest.get(split..)) {
            if is_mention(tail) && head.chars().last().map_or(true, char::is_whitespace) {
                rest = head;
            }
        }
    }
    rest.trim()
}
