//! scriptlet-worker: executes host-supplied scripts over a framed socket.
//!
//! # Usage
//!
//! ```text
//! scriptlet-worker <PORT> <TOKEN>
//! ```
//!
//! Everything else comes from the config file and environment; see
//! [`scriptlet_worker::config`]. Logs go to stderr, script `print` output
//! to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use scriptlet_worker::{ConfigLoader, RunExecutor, WorkerConfig, WorkerSession};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Remote script-execution worker
#[derive(Parser, Debug)]
#[command(name = "scriptlet-worker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port the host listens on
    port: u16,

    /// Authentication token issued by the host
    token: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("scriptlet-worker: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    match run(&args, &config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &WorkerConfig) -> Result<u8> {
    let layout = config
        .channel_layout()
        .context("resolving channel directory")?;
    info!(dir = %layout.dir().display(), "Channel directory");

    let executor = RunExecutor::new(layout, config.sandbox());
    let session = WorkerSession::connect(
        &config.connection.host,
        args.port,
        args.token.clone(),
        config.protocol.clone(),
        executor,
    )?;

    let reason = session.run();
    Ok(reason.exit_code())
}

/// Stderr subscriber; `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &WorkerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(filter))
        .init();
}
