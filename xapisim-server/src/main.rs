//! # xapisim Server
//!
//! In-memory XenAPI simulator for exercising XenAPI clients without a
//! real hypervisor.
//!
//! ## Usage
//! ```bash
//! xapisim-server --config /etc/xapisim/server.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use xapisim_common::LogFormat;
use xapisim_server::cli::Args;
use xapisim_server::config::{Config, DEFAULT_CONFIG_PATH};
use xapisim_server::server;

enum ConfigSource {
    Explicit(String),
    Default,
    Builtin,
}

fn resolve_config(args: &Args) -> Result<(Config, ConfigSource)> {
    match &args.config {
        // An explicit config file must load
        Some(path) => {
            let config = Config::load(path)?;
            Ok((config.with_cli_overrides(args), ConfigSource::Explicit(path.clone())))
        }
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(config) => Ok((config.with_cli_overrides(args), ConfigSource::Default)),
            Err(_) => Ok((Config::default().with_cli_overrides(args), ConfigSource::Builtin)),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, source) = resolve_config(&args)?;

    LogFormat::from_json_flag(config.logging.json).init(&config.logging.level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting xapisim server"
    );

    match source {
        ConfigSource::Explicit(path) => info!(config_path = %path, "Configuration loaded"),
        ConfigSource::Default => info!(
            config_path = %DEFAULT_CONFIG_PATH,
            "Configuration loaded from default location"
        ),
        ConfigSource::Builtin => info!("No config file found, using CLI arguments and defaults"),
    }

    info!(
        listen = %config.server.listen_address,
        session_idle_timeout_secs = config.simulator.session_idle_timeout_secs,
        "Simulator configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
