//! evetrack - EVE Online industry tracking companion

use clap::Parser;

mod auth;
mod cache;
mod cli;
mod client;
mod config;
mod error;
mod scanner;
mod supervisor;

use cli::{AuthCommands, CacheCommands, Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cli::init::run(cli.config.as_deref()),
        Commands::Serve => cli::serve::run(cli.config.as_deref()).await,
        Commands::Scan => cli::scan::run(cli.config.as_deref()).await,
        Commands::Status => cli::status::run(cli.config.as_deref()),
        Commands::Version => {
            println!("evetrack version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Auth(auth_cmd) => match auth_cmd {
            AuthCommands::Add {
                character_id,
                name,
                refresh_token,
                scopes,
            } => cli::auth::add(
                cli.config.as_deref(),
                character_id,
                &name,
                &refresh_token,
                scopes,
            ),
            AuthCommands::Refresh { character_id } => {
                cli::auth::refresh(cli.config.as_deref(), character_id).await
            }
            AuthCommands::List => cli::auth::list(),
        },
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(cli.config.as_deref()),
            CacheCommands::Clear => cli::cache::clear(),
            CacheCommands::Path => cli::cache::path(),
        },
    }
}
