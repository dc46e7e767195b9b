//! Elmyra HTTP server
//!
//! Serves visualizations and runs engine jobs on request.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use elmyra_core::{http, logging, App, Config, EngineWorker};

#[derive(Parser)]
#[command(name = "elmyra-server")]
#[command(about = "Elmyra - serves and versions rendered visualizations")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store root (overrides the config file)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Engine executable (overrides the config file)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Kill engine jobs running longer than this many seconds
    #[arg(long)]
    job_timeout_secs: Option<u64>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(engine) = cli.engine {
        config.engine = engine;
    }
    if cli.job_timeout_secs.is_some() {
        config.job_timeout_secs = cli.job_timeout_secs;
    }
    config.log.json |= cli.json_logs;

    logging::init(&config.log).context("initializing logging")?;

    let layout = config.layout();
    for dir in [&layout.visualizations, &layout.imports, &layout.uploads] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let worker = EngineWorker::from_config(&config);
    let app = Arc::new(App::new(worker, &config));

    info!(
        version = elmyra_core::VERSION,
        bind = %config.bind,
        root = %config.root.display(),
        engine = %config.engine.display(),
        "elmyra listening"
    );
    warp::serve(http::routes(app)).run(config.bind).await;

    Ok(())
}
