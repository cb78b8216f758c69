//! Keygen command implementation.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ocipack_publish::SigningKeyPair;

/// Arguments for the keygen command.
#[derive(Args)]
pub struct KeygenArgs {
    /// Write the private key here and the public key next to it as `.pub`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Runs the keygen command.
///
/// # Errors
///
/// Returns an error if the key files cannot be written.
pub fn run(args: &KeygenArgs) -> Result<()> {
    let key_pair = SigningKeyPair::generate();

    let Some(output) = &args.output else {
        println!("Private Key (keep this secret!):");
        println!("{}", key_pair.to_base64());
        println!();
        println!("Public Key (distribute to verifiers):");
        println!("{}", key_pair.public_key_base64());
        return Ok(());
    };

    let public_path = output.with_extension("pub");
    fs::write(output, key_pair.to_base64())
        .with_context(|| format!("Failed to write private key: {}", output.display()))?;
    fs::write(&public_path, key_pair.public_key_base64())
        .with_context(|| format!("Failed to write public key: {}", public_path.display()))?;

    println!("Private key: {}", output.display());
    println!("Public key:  {}", public_path.display());
    println!();
    println!("Publish with: ocipack publish --signing-key-file {} ...", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keygen_writes_usable_key_pair() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("signing.key");

        run(&KeygenArgs {
            output: Some(output.clone()),
        })
        .unwrap();

        let private = fs::read_to_string(&output).unwrap();
        let public = fs::read_to_string(dir.path().join("signing.pub")).unwrap();
        let key_pair = SigningKeyPair::from_base64(&private).unwrap();
        assert_eq!(key_pair.public_key_base64(), public);
    }
}
