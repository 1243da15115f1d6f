mod commands;

use clap::{Parser, Subcommand};
use splitsteal_core::{Amount, Choice};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "splitsteal")]
#[command(about = "Split-or-steal commit-reveal session client")]
#[command(version)]
struct Cli {
    /// Data directory for the secret vault
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a full session between two local accounts
    Play {
        /// Bet in base units
        #[arg(long, default_value = "1000")]
        bet: Amount,
        /// Player A's choice (split or steal)
        #[arg(long)]
        a: Choice,
        /// Player B's choice (split or steal)
        #[arg(long)]
        b: Choice,
        /// Seal pending secrets in the data directory
        #[arg(long)]
        persist: bool,
        /// Vault passphrase
        #[arg(long, default_value = "splitsteal")]
        passphrase: String,
    },
    /// Show how a pair of choices is classified
    Classify {
        /// Player A's choice
        a: Choice,
        /// Player B's choice
        b: Choice,
    },
    /// Print the client configuration
    Config {
        /// Include the encrypted secret vault in the data directory
        #[arg(long)]
        persist: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "splitsteal={},splitsteal_session={},splitsteal_core={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("splitsteal")
    });

    let result = match cli.command {
        Commands::Play {
            bet,
            a,
            b,
            persist,
            passphrase,
        } => {
            let vault_path = persist.then(|| data_dir.join("secrets.db"));
            commands::play(bet, a, b, vault_path, &passphrase).await
        }
        Commands::Classify { a, b } => commands::classify(a, b),
        Commands::Config { persist } => {
            commands::show_config(persist.then(|| data_dir.join("secrets.db")))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
