//! CLI commands and argument parsing.

pub mod keygen;
pub mod publish;

use clap::{Parser, Subcommand};

/// ocipack - publish packages as OCI artifacts with provenance
#[derive(Parser)]
#[command(name = "ocipack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Publish staged archives to a registry
    Publish(publish::PublishArgs),

    /// Generate an Ed25519 key pair for local attestation signing
    Keygen(keygen::KeygenArgs),

    /// Print version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["ocipack", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }
}
