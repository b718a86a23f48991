//! Periodic telemetry logger.
//!
//! While running, a background task samples every registered signal on a
//! fixed period and appends one timestamped CSV row per tick. The registry
//! is read fresh on each tick, so signals added by `log` commands mid-run
//! appear as extra columns from that tick on; the header reflects the set
//! present when the file was first created. The logger task is the only
//! writer of the file, which serializes appends by construction.

use crate::context::ExecutionContext;
use crate::error::EngineResult;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct PeriodicLogger {
    task: Option<LoggerTask>,
}

struct LoggerTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    period: Duration,
}

impl Default for PeriodicLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicLogger {
    pub fn new() -> Self {
        Self { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Starts the tick task. A second start while running is ignored.
    pub fn start(&mut self, ctx: Arc<ExecutionContext>, path: PathBuf, period: Duration) {
        if self.task.is_some() {
            warn!("periodic logger already running");
            return;
        }
        info!(path = %path.display(), period_s = period.as_secs_f64(), "starting periodic logging");
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = write_tick(&ctx, &path).await {
                            warn!(error = %err, "log tick failed");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });
        self.task = Some(LoggerTask {
            stop_tx,
            handle,
            period,
        });
    }

    /// Stops the tick task, waiting for any in-flight tick to finish.
    /// Idempotent; after this returns, nothing is left writing.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        info!("stopping periodic logging");
        let _ = task.stop_tx.send(true);
        let abort = task.handle.abort_handle();
        let grace = task.period + Duration::from_secs(1);
        if tokio::time::timeout(grace, task.handle).await.is_err() {
            warn!("logger tick did not finish in time, aborting");
            abort.abort();
        }
    }
}

async fn write_tick(ctx: &ExecutionContext, path: &Path) -> EngineResult<()> {
    let signals = ctx.logged_signals();
    let is_new_file = !path.is_file();
    if is_new_file {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f");
    let mut values = Vec::with_capacity(signals.len());
    for (_, device) in &signals {
        match device.read().await {
            Ok(value) => values.push(value.to_string()),
            // unreadable signals must not fail the tick
            Err(_) => values.push("Disconnected".to_string()),
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if is_new_file {
        let names: Vec<String> = signals
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .collect();
        writeln!(file, "Timestamp,{}", names.join(","))?;
    }
    writeln!(file, "{timestamp},{}", values.join(","))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaitSettings;
    use crate::device::{Device, MockAxis};
    use std::collections::HashMap;

    fn context() -> Arc<ExecutionContext> {
        let axis = Arc::new(MockAxis::new("galil"));
        let mut devices: HashMap<String, Arc<dyn Device>> = HashMap::new();
        devices.insert("galil".to_string(), axis.clone());
        devices.insert("galil_val".to_string(), axis.clone());
        devices.insert("galil_rbv".to_string(), axis);
        ExecutionContext::new(devices, PathBuf::from("."), WaitSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_header_then_rows() {
        let ctx = context();
        let rbv = ctx.resolve_signal("Galil RBV").unwrap();
        ctx.log_signal("Galil RBV", rbv);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        write_tick(&ctx, &path).await.unwrap();
        write_tick(&ctx, &path).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,\"Galil RBV\"");
        // each row has the same column count as the header
        assert_eq!(lines[1].split(',').count(), 2);
        assert_eq!(lines[2].split(',').count(), 2);
    }

    #[tokio::test]
    async fn test_header_order_matches_registration_order() {
        let ctx = context();
        let rbv = ctx.resolve_signal("Galil RBV").unwrap();
        let val = ctx.resolve_signal("Galil VAL").unwrap();
        ctx.log_signal("Galil RBV", rbv);
        ctx.log_signal("Galil VAL", val);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        write_tick(&ctx, &path).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Timestamp,\"Galil RBV\",\"Galil VAL\""));
    }

    #[tokio::test]
    async fn test_disconnected_signal_uses_placeholder() {
        let ctx = context();
        let axis = Arc::new(MockAxis::new("dead"));
        axis.set_connected(false);
        ctx.log_signal("Dead PV", axis);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        write_tick(&ctx, &path).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with("Disconnected"));
    }

    #[tokio::test]
    async fn test_start_stop_is_idempotent() {
        let ctx = context();
        let rbv = ctx.resolve_signal("Galil RBV").unwrap();
        ctx.log_signal("Galil RBV", rbv);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut logger = PeriodicLogger::new();
        logger.start(ctx, path.clone(), Duration::from_millis(10));
        assert!(logger.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        logger.stop().await;
        assert!(!logger.is_running());
        logger.stop().await; // second stop is a no-op

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.lines().count() >= 2);
    }
}
