//! Command-line argument parsing.

use clap::Parser;

/// xapisim - in-memory XenAPI simulator
#[derive(Parser, Debug, Default)]
#[command(name = "xapisim-server")]
#[command(about = "xapisim - in-memory XenAPI simulator speaking XML-RPC over HTTP")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Listen address for the XML-RPC endpoint
    #[arg(long)]
    pub listen: Option<String>,

    /// Initial password of the root user
    #[arg(long, env = "XAPISIM_ROOT_PASSWORD")]
    pub root_password: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}
