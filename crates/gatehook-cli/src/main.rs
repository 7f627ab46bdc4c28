//! Gatehook - scripted request authorization gateway
//!
//! - `gatehook serve` runs the HTTP gateway in front of the protected service
//! - `gatehook check` loads the manifest and reports what would be enforced

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use gatehook_core::{EmptyPolicy, FailurePolicy, GatewayConfig};

mod check;
mod serve;

/// Gatehook - plugin driven request authorization
#[derive(Parser)]
#[command(name = "gatehook")]
#[command(about = "Authorize requests with scripted plugins", long_about = None)]
struct Cli {
    /// Gateway config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Plugin manifest, overrides the config file
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Target service name plugins are matched against
    #[arg(short, long, global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    ///
    /// Loads every enabled plugin, runs their `init` hooks once and then
    /// admits only requests every plugin allows.
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Per-hook time limit in milliseconds
        #[arg(long)]
        hook_timeout_ms: Option<u64>,

        /// Deny every request when no plugin targets this service
        #[arg(long)]
        deny_when_empty: bool,

        /// Admit requests when a plugin hook fails (fail open)
        #[arg(long)]
        fail_open: bool,

        /// Refuse to start if the manifest or any plugin fails to load
        #[arg(long)]
        strict: bool,
    },

    /// Load the manifest and report plugin status without serving
    Check,
}

impl Cli {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => GatewayConfig::default(),
        };
        if let Some(manifest) = &self.manifest {
            config.manifest = manifest.clone();
        }
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut config = cli.gateway_config()?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            hook_timeout_ms,
            deny_when_empty,
            fail_open,
            strict,
        } => {
            if let Some(ms) = hook_timeout_ms {
                config.hook_timeout_ms = ms;
            }
            if deny_when_empty {
                config.on_empty = EmptyPolicy::Deny;
            }
            if fail_open {
                config.on_hook_failure = FailurePolicy::Allow;
            }
            config.strict |= strict;

            serve::run(host, port, config).await
        }
        Commands::Check => check::run(config).await,
    }
}
