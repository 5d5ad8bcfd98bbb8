use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tokio::time::sleep;

use tallerbot::cli::{Cli, Commands};
use tallerbot::core::{config, init_logger, parse_level, SessionBackend};
use tallerbot::flow::Flow;
use tallerbot::storage::jobs::count_jobs;
use tallerbot::storage::{
    create_pool, db, get_connection, MemorySessionStore, SessionStore, SqliteJobLedger, SqliteSessionStore,
};
use tallerbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};
use tallerbot::Conversation;

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, flow, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH, parse_level(&config::LOG_LEVEL))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot().await,
        Commands::CheckDb => check_db(),
        Commands::ValidateFlow { path } => validate_flow(path.as_deref().unwrap_or(config::FLOW_FILE_PATH.as_str())),
    }
}

/// Opens the database, applies pending migrations and prints what it finds.
fn check_db() -> Result<()> {
    println!("Database: {}", *config::DATABASE_PATH);

    let pool = create_pool(&config::DATABASE_PATH)?;
    let conn = get_connection(&pool)?;

    println!("SQLite version: {}", db::sqlite_version(&conn)?);
    println!("Migrations: up to date");
    println!("Jobs: {}", count_jobs(&conn)?);
    Ok(())
}

/// Loads a flow document and fails if any step points nowhere.
fn validate_flow(path: &str) -> Result<()> {
    let flow = Flow::load(path)?;
    let unresolved = flow.unresolved_references();

    println!("Flow: {}", path);
    println!("Steps: {}", flow.step_count());
    println!("Initial step: {}", flow.initial_step());

    if unresolved.is_empty() {
        println!("All step references resolve");
        return Ok(());
    }

    for (step, target) in &unresolved {
        match target {
            Some(target) => println!("  {} -> {} (no such step)", step, target),
            None => println!("  {} has no next step", step),
        }
    }
    anyhow::bail!("{} unresolved step reference(s) in {}", unresolved.len(), path)
}

async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");

    let flow = Arc::new(Flow::load(config::FLOW_FILE_PATH.as_str())?);
    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);

    let sessions: Arc<dyn SessionStore> = match *config::SESSION_BACKEND {
        SessionBackend::Sqlite => Arc::new(SqliteSessionStore::new(Arc::clone(&db_pool))),
        SessionBackend::Memory => {
            log::warn!("Using in-memory sessions; conversations in progress are lost on restart");
            Arc::new(MemorySessionStore::new())
        }
    };
    let ledger = Arc::new(SqliteJobLedger::new(Arc::clone(&db_pool)));
    let conversation = Arc::new(Conversation::new(flow, sessions, ledger));

    if config::staff::STAFF_IDS.is_empty() {
        log::warn!("STAFF_IDS is empty; staff commands are disabled");
    }

    let bot = create_bot()?;

    // Retry while a local Bot API server is still starting
    let bot_info = {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) if attempt < config::retry::MAX_STARTUP_ATTEMPTS => {
                    let delay = config::retry::startup_delay(attempt);
                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt,
                        config::retry::MAX_STARTUP_ATTEMPTS,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to Bot API after {} attempts: {}",
                        attempt,
                        e
                    ))
                }
            }
        }
    };
    let bot_username = bot_info.username.clone();
    let bot_id = bot_info.id;
    log::info!("Bot username: {:?}, Bot ID: {}", bot_username, bot_id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let deps = HandlerDeps::new(
        conversation,
        db_pool,
        Arc::new(config::staff::STAFF_IDS.clone()),
        bot_username,
        bot_id,
    );

    let listener = Polling::builder(bot.clone()).build();

    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}
