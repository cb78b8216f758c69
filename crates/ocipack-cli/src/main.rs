//! ocipack CLI - publishes versioned packages as OCI artifacts.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocipack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Publish(args) => commands::publish::run(&args).await,
        Commands::Keygen(args) => commands::keygen::run(&args),
        Commands::Version => {
            println!("ocipack {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
