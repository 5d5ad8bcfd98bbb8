//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::commands::handle_command;
use super::types::{message_lang, sender_of, HandlerDeps, HandlerError};
use crate::i18n;
use crate::telegram::bot::{is_message_addressed_to_bot, strip_bot_mention, Command};
use crate::telegram::Bot;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Commands are matched first; any other text addressed to the bot feeds the
/// booking conversation.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);
                handle_command(&bot, &msg, cmd, &deps).await
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let bot_username = deps.bot_username.clone();
    let bot_id = deps.bot_id;
    let mention_username = deps.bot_username.clone();

    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .filter(move |msg: Message| is_message_addressed_to_bot(&msg, bot_username.as_deref(), bot_id))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            let username = mention_username.clone();
            async move {
                let text = strip_bot_mention(msg.text().unwrap_or_default(), username.as_deref());
                let lang = message_lang(&msg);
                let sender = sender_of(&msg);

                let reply = match deps.conversation.handle_text(sender, text, &lang) {
                    Ok(reply) => reply,
                    Err(e) => {
                        log::error!("Conversation failed for user_id={:?}: {}", sender.user_id, e);
                        Some(i18n::t(&lang, "booking-unavailable"))
                    }
                };

                if let Some(reply) = reply {
                    bot.send_message(msg.chat.id, reply).await?;
                }
                Ok(())
            }
        })
}
