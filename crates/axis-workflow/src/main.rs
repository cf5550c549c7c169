//! Axis Workflow - Main entry point
//!
//! Runs one provisioning step per invocation. The orchestrator calls the steps
//! in order: discover, provision, configure, verify, and finally notify.

mod config;
mod configure;
mod firmware;
mod firmware_fetch;
mod notify;
mod overlay;
mod provision;
mod steps;
mod storage;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use axis_core::{FileStateStore, Resource};
use axis_discovery::{IcmpPinger, NmapScanner};
use axis_vapix::HttpTransport;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::firmware_fetch::FirmwareCache;
use crate::steps::{Backends, Step, Workflow};

#[derive(Parser, Debug)]
#[command(name = "axis-workflow")]
#[command(about = "Provision and configure Axis network cameras")]
#[command(version)]
struct Args {
    /// Step to run
    #[arg(long, value_enum)]
    command: Step,

    /// Path to configuration file
    #[arg(short, long, default_value = "axis-workflow.toml")]
    config: PathBuf,

    /// Resource description (JSON). Falls back to the RESOURCE environment variable.
    #[arg(short, long)]
    resource: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Axis workflow v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    let resource = load_resource(args.resource.as_deref())?;

    info!(
        resource = %resource.name(),
        state = %config.state.path.display(),
        "Configuration loaded"
    );

    let backends = Backends {
        store: Arc::new(FileStateStore::new(&config.state.path)),
        transport: Arc::new(HttpTransport::new().context("Failed to create HTTP transport")?),
        scanner: Arc::new(NmapScanner::new(config.discovery.clone())),
        pinger: Arc::new(IcmpPinger),
        firmware: Arc::new(FirmwareCache::new(
            &config.firmware.base_url,
            &config.firmware.cache_dir,
        )?),
    };

    Workflow::new(config, resource, backends)
        .run(args.command)
        .await
}

/// Read the resource from `path`, or from `RESOURCE` when no path is given
fn load_resource(path: Option<&Path>) -> Result<Resource> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read resource {}", path.display()))?,
        None => std::env::var("RESOURCE")
            .context("RESOURCE is a required environment variable when --resource is not given")?,
    };
    parse_resource(&content)
}

fn parse_resource(content: &str) -> Result<Resource> {
    let resource: Resource =
        serde_json::from_str(content).context("Failed to parse resource description")?;
    resource
        .network_intent()
        .with_context(|| format!("Invalid resource '{}'", resource.name()))?;
    Ok(resource)
}
