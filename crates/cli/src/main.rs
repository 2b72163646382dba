//! Command-line entry point for the creature engine.
//!
//! Loads a JSON fixture of creatures into in-memory stores, then either
//! computes them or applies one property as an action and prints the log.
//!
//! ```bash
//! creature compute fixtures/fighter.json
//! creature act fixtures/fighter.json longsword --target goblin --write
//! ```

mod commands;
mod fixture;
mod logging;

use anyhow::Result;
use clap::Parser;
use commands::{Act, Compute};

/// Compute creature sheets and apply actions from JSON fixtures
#[derive(Parser)]
#[command(name = "creature")]
#[command(about = "Compute creature sheets and apply actions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Compute every creature in a fixture and print its variables
    Compute(Compute),

    /// Simulate applying a property, and optionally write the result
    Act(Act),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (for CREATURE_* settings)
    let _ = dotenvy::dotenv();

    let _guard = logging::setup_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Compute(cmd) => cmd.execute().await,
        Command::Act(cmd) => cmd.execute().await,
    }
}
