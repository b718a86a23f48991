//! Binary entry point: builds the simulated device registry, shared context,
//! and periodic logger, then drives the top-level script.

use anyhow::Result;
use clap::Parser;
use galscript::config::Settings;
use galscript::context::ExecutionContext;
use galscript::device::{Device, MockAxis};
use galscript::logger::PeriodicLogger;
use galscript::sequencer::{Flow, Sequencer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "galscript", about = "Motion-controller script sequencer")]
struct Args {
    /// Path to the script to execute.
    script: PathBuf,

    /// Optional TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the telemetry log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = args.log_dir {
        settings.logging.directory = dir;
    }
    settings.validate()?;

    // Simulated registry: one axis backs the motor and its VAL/RBV signals.
    let axis = Arc::new(MockAxis::new("galil"));
    let mut devices: HashMap<String, Arc<dyn Device>> = HashMap::new();
    devices.insert("galil".to_string(), axis.clone());
    devices.insert("galil_val".to_string(), axis.clone());
    devices.insert("galil_rbv".to_string(), axis);

    let script_dir = settings.script_dir.clone().unwrap_or_else(|| {
        args.script
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    });
    let ctx = ExecutionContext::new(devices, script_dir, settings.wait.clone())?;
    let sequencer = Sequencer::new(ctx.clone());

    let log_path = settings.logging.directory.join(format!(
        "{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let mut logger = PeriodicLogger::new();
    logger.start(
        ctx.clone(),
        log_path,
        Duration::from_secs_f64(settings.logging.period_s),
    );

    let result = tokio::select! {
        res = sequencer.execute_script(&args.script) => res,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting run");
            Ok(Flow::ExitRun)
        }
    };

    // teardown: nothing may keep sampling or watching after the run
    logger.stop().await;
    ctx.shutdown();

    match result {
        Ok(flow) => {
            info!(?flow, "run complete");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "run failed");
            Err(err.into())
        }
    }
}
