use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hashlease — marketplace control plane for short-term hashpower rental.
#[derive(Parser)]
#[command(name = "hashlease", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the control-plane HTTP API (ledger, orders, disputes, proxy ingress).
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,

        /// Directory holding the sqlite database.
        #[arg(long, default_value = "~/.hashlease")]
        data_dir: PathBuf,
    },

    /// Generate a single order code and print it (ops utility; §9 open question).
    GenCode {
        /// Directory holding the sqlite database, checked for collisions.
        #[arg(long, default_value = "~/.hashlease")]
        data_dir: PathBuf,
    },
}
