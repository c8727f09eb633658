//! Command line interface for fetching an author's long-form feed and
//! profile from Nostr relays, plus offline identifier conversion.

use anyhow::Context;
use clap::{Parser, Subcommand};
use relayfeed::{
    client::{self, RelayClient},
    identifier::{self, CanonicalAuthorKey, NPUB_PREFIX},
    Settings,
};
use tracing_subscriber::EnvFilter;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "relayfeed",
    author,
    version,
    about = "Aggregate long-form Nostr content from several relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch an author's long-form posts and print the feed as JSON.
    Fetch { identifier: String },
    /// Fetch an author's newest profile metadata and print it as JSON.
    Profile { identifier: String },
    /// Print the hex public key behind an identifier.
    Decode { identifier: String },
    /// Encode a 32-byte hex public key.
    Encode {
        hex: String,
        #[arg(long, default_value = NPUB_PREFIX)]
        prefix: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "relayfeed=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Decode { identifier } => {
            let key = client::resolve(&identifier)?;
            println!("{key}");
        }
        Commands::Encode { hex, prefix } => {
            let key = CanonicalAuthorKey::from_hex(hex.trim())?;
            println!("{}", identifier::encode(&prefix, key.as_bytes())?);
        }
        Commands::Fetch { identifier } => {
            let settings = Settings::from_env(&cli.env)?;
            let client = RelayClient::from_settings(&settings);
            let feed = client
                .fetch_content(&identifier)
                .await
                .with_context(|| format!("fetching content for {identifier}"))?;
            println!("{}", serde_json::to_string_pretty(&feed)?);
        }
        Commands::Profile { identifier } => {
            let settings = Settings::from_env(&cli.env)?;
            let client = RelayClient::from_settings(&settings);
            let profile = client
                .fetch_profile(&identifier)
                .await
                .with_context(|| format!("fetching profile for {identifier}"))?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}
