mod cmd;
mod config;
mod dump;
mod error;

use clap::Parser;
use config::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Browse(args) => cmd::browse::run(&cli.config, args).await,
        Commands::Stream(args) => cmd::stream::run(&cli.config, args).await,
        Commands::Topics => cmd::topics::run(&cli.config).await,
        Commands::Schema(args) => cmd::schema::run(&cli.config, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
