//! CLI surface (§6, §10.4).

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "blockperf-agent", version, about = "Node-side telemetry agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the agent version and exit.
    Version,
    /// Start the agent.
    Run,
    /// Obtain an API key via a signed challenge (placeholder; §10.4).
    Register {
        #[arg(long = "pool-id")]
        pool_id: String,
        #[arg(long = "calidus-skey")]
        calidus_skey: std::path::PathBuf,
        #[arg(long)]
        network: Option<String>,
        #[arg(long = "api-url")]
        api_url: Option<String>,
    },
}
