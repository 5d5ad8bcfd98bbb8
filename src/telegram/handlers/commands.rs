//! Command handler implementations

use teloxide::prelude::*;
use teloxide::types::Message;
use unic_langid::LanguageIdentifier;

use super::types::{message_lang, sender_of, HandlerDeps, HandlerError};
use crate::i18n;
use crate::storage::get_connection;
use crate::telegram::bot::Command;
use crate::telegram::staff::{self, customer_jobs_text, run_staff_command, StaffCommand};
use crate::telegram::Bot;

/// Routes one parsed command and sends the reply.
pub(super) async fn handle_command(bot: &Bot, msg: &Message, cmd: Command, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let lang = message_lang(msg);
    let sender = sender_of(msg);

    let reply = match StaffCommand::from_command(&cmd) {
        Some(parsed) => staff_reply(parsed, sender.user_id, &lang, deps),
        None => customer_reply(&cmd, sender.user_id, &lang, deps),
    };

    if let Some(text) = reply {
        bot.send_message(msg.chat.id, text).await?;
    }
    Ok(())
}

fn customer_reply(cmd: &Command, user_id: Option<i64>, lang: &LanguageIdentifier, deps: &HandlerDeps) -> Option<String> {
    let reply = match cmd {
        Command::Start => i18n::t(lang, "start-greeting"),
        Command::Ayuda => i18n::t(lang, "help-text"),
        Command::Agendar => {
            let user_id = user_id?;
            deps.conversation.start(user_id).unwrap_or_else(|e| {
                log::error!("Failed to start booking for user_id={}: {}", user_id, e);
                i18n::t(lang, "booking-unavailable")
            })
        }
        Command::Cancelar => {
            let user_id = user_id?;
            deps.conversation.cancel(user_id, lang).unwrap_or_else(|e| {
                log::error!("Failed to cancel booking for user_id={}: {}", user_id, e);
                i18n::t(lang, "booking-unavailable")
            })
        }
        Command::MisTrabajos => {
            let user_id = user_id?;
            get_connection(&deps.db_pool)
                .and_then(|conn| customer_jobs_text(&conn, lang, user_id))
                .unwrap_or_else(|e| {
                    log::error!("Failed to list jobs for user_id={}: {}", user_id, e);
                    i18n::t(lang, "command-failed")
                })
        }
        Command::Trabajos(_) | Command::Estado(_) | Command::SetEstado(_) | Command::Progreso(_) | Command::Nota(_) => {
            return None;
        }
    };
    Some(reply)
}

fn staff_reply(
    parsed: Result<StaffCommand, staff::StaffUsage>,
    user_id: Option<i64>,
    lang: &LanguageIdentifier,
    deps: &HandlerDeps,
) -> Option<String> {
    let actor_id = match user_id {
        Some(id) if staff::is_staff(Some(id), &deps.staff_ids) => id,
        _ => {
            log::warn!("Staff command denied for user_id={:?}", user_id);
            return Some(i18n::t(lang, "staff-access-denied"));
        }
    };

    let cmd = match parsed {
        Ok(cmd) => cmd,
        Err(usage) => return Some(usage.text(lang)),
    };

    let reply = get_connection(&deps.db_pool)
        .and_then(|conn| run_staff_command(&conn, lang, &cmd, actor_id))
        .unwrap_or_else(|e| {
            log::error!("Staff command {:?} failed for user_id={}: {}", cmd, actor_id, e);
            i18n::t(lang, "command-failed")
        });
    Some(reply)
}
