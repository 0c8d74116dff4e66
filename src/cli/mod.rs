use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod export;
pub mod import;
pub mod roster;
pub mod serve;

pub use export::run_export;
pub use import::run_import;
pub use roster::{run_clear, run_participants, run_reset_sent};
pub use serve::run_serve;

#[derive(Parser)]
#[command(name = "surveysms")]
#[command(about = "Consent-managed SMS survey roster and dispatcher")]
#[command(version)]
pub struct Cli {
    /// Database file (overrides SURVEY_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook and admin HTTP server
    Serve(ServeArgs),
    /// Load participants from a roster CSV
    Import(ImportArgs),
    /// Write participants and responses to a CSV file
    Export(ExportArgs),
    /// List every participant
    Participants,
    /// Delete all participants and responses
    Clear(ClearArgs),
    /// Mark every participant as not yet surveyed
    ResetSent,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Path to the CSV file
    pub file: PathBuf,
    /// Send consent requests to every imported number
    #[arg(long)]
    pub send_consent: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output file (defaults to survey_data_<timestamp>.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}
