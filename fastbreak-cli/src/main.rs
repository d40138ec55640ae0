mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use fastbreak_core::{FastbreakError, Network};
use fastbreak_draw::DrawError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fastbreak")]
#[command(about = "Fast-BREAK - commit/reveal NBA team draws on Flow")]
#[command(version)]
struct Cli {
    /// Client config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Flow network (mainnet, testnet, emulator)
    #[arg(short, long, global = true)]
    network: Option<Network>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a draw against the simulated ledger
    Draw(commands::DrawArgs),

    /// Show the assignments the contract holds
    Assignments(commands::AssignmentsArgs),

    /// Show the latest sealed block height
    Height,

    /// List the teams in the draw
    Teams,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "fastbreak={0},fastbreak_core={0},fastbreak_draw={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match CliConfig::default().resolve(cli.config.as_deref(), cli.network) {
        Ok(config) => match cli.command {
            Commands::Draw(args) => commands::handle_draw_command(args, config).await,
            Commands::Assignments(args) => {
                commands::handle_assignments_command(args, &config).await
            }
            Commands::Height => commands::handle_height_command(&config).await,
            Commands::Teams => commands::handle_teams_command(),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

fn report(error: &anyhow::Error) {
    let core = error
        .downcast_ref::<FastbreakError>()
        .or_else(|| match error.downcast_ref::<DrawError>() {
            Some(DrawError::Core(e)) => Some(e),
            _ => None,
        });

    match core {
        Some(e) if e.is_authorization() => {
            eprintln!("Error: {}", e);
            eprintln!("Connect the wallet and approve the transaction to continue");
        }
        Some(FastbreakError::Execution {
            transaction_id,
            message,
        }) => {
            eprintln!("Error: Transaction {} failed", transaction_id);
            eprintln!("{}", message);
        }
        Some(FastbreakError::Stalled(msg)) => {
            eprintln!("Error: Cancelled: {}", msg);
            eprintln!("A pending receipt may remain in the signer's account");
        }
        Some(FastbreakError::Config(msg)) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        Some(FastbreakError::Network(e)) => {
            eprintln!("Error: Could not reach the access node: {}", e);
        }
        _ => match error.downcast_ref::<DrawError>() {
            Some(e) if e.is_input() => eprintln!("{}", e),
            _ => eprintln!("Error: {:#}", error),
        },
    }
}
