//! Subcommands. Each one seeds a fresh in-memory runtime from its fixture.

mod act;
mod compute;

use std::path::Path;

use anyhow::{Context, Result};
use creature_runtime::{Runtime, RuntimeConfig};

use crate::fixture::Fixture;

pub use act::Act;
pub use compute::Compute;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Full JSON output
    Json,
}

/// Loads `path` into a new runtime and computes every creature in it.
async fn seeded_runtime(path: &Path) -> Result<(Fixture, Runtime)> {
    let fixture = Fixture::load(path)?;
    let runtime = Runtime::builder().config(RuntimeConfig::from_env()).build();
    fixture.seed(&runtime)?;
    for creature_id in fixture.creature_ids() {
        runtime
            .compute_creature(creature_id)
            .await
            .with_context(|| format!("Failed to compute `{creature_id}`"))?;
    }
    Ok((fixture, runtime))
}
