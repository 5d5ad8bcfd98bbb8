use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tallerbot")]
#[command(author, version, about = "Telegram bot for booking workshop appointments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with long polling (default)
    Run,

    /// Open the database, apply migrations and print a short report
    CheckDb,

    /// Load a flow document and report broken step references
    ValidateFlow {
        /// Flow file to check (defaults to FLOW_FILE_PATH)
        #[arg(short, long)]
        path: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
