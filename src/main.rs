use clap::Parser;
use surveysms::cli::{
    run_clear, run_export, run_import, run_participants, run_reset_sent, run_serve, Cli, Commands,
};
use surveysms::{Config, Database};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Serve(args) => {
            run_serve(config, args.port)?;
        }
        Commands::Import(args) => {
            let db = Database::open_at(&config.db_path)?;
            run_import(&db, &config, &args.file, args.send_consent)?;
        }
        Commands::Export(args) => {
            let db = Database::open_at(&config.db_path)?;
            run_export(&db, args.output.as_deref())?;
        }
        Commands::Participants => {
            let db = Database::open_at(&config.db_path)?;
            run_participants(&db)?;
        }
        Commands::Clear(args) => {
            let db = Database::open_at(&config.db_path)?;
            run_clear(&db, args.yes)?;
        }
        Commands::ResetSent => {
            let db = Database::open_at(&config.db_path)?;
            run_reset_sent(&db)?;
        }
    }

    Ok(())
}
