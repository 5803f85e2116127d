//! autotag CLI - suggest keywords for Lightroom photos and write them to XMP sidecars.
//!
//! Every image is embedded with a CLIP model and compared against a keyword
//! vocabulary. Matching keywords are merged into the image's `.xmp` sidecar,
//! and a JSON report of all suggestions is written next to the run.
//!
//! # Usage
//!
//! ```bash
//! # Tag every image in a Lightroom catalog
//! autotag tag --catalog ~/Pictures/Lightroom/Catalog.lrcat
//!
//! # Tag a folder, preview only
//! autotag tag --image-folder ./photos --dry-run --threshold 0.3
//!
//! # Inspect a vocabulary file
//! autotag vocab "Foundation List 2.0.1.txt"
//!
//! # Fetch the CLIP model
//! autotag models download
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// autotag - CLIP keyword suggestions for photo catalogs.
#[derive(Parser, Debug)]
#[command(name = "autotag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Suggest keywords for a catalog or folder and merge them into sidecars
    Tag(cli::tag::TagArgs),

    /// Parse a keyword vocabulary file
    Vocab(cli::vocab::VocabArgs),

    /// Manage the CLIP model files (download, list, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't up yet, so config warnings go straight to stderr.
    let config = match autotag_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `autotag config path`."
            );
            autotag_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("autotag v{}", autotag_core::VERSION);

    match cli.command {
        Commands::Tag(args) => cli::tag::execute(args).await,
        Commands::Vocab(args) => cli::vocab::execute(args),
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Config(args) => cli::config::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["autotag", "vocab", "terms.txt", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Vocab(_)));
    }
}
