//! Fault-watch ("failif") subsystem.
//!
//! Each active watch is an independent task subscribed to one device's
//! value-change stream. When a notification equals the configured trigger
//! value, the watch re-enters the sequencer on the configured fail script,
//! concurrently with whatever the main flow is doing. Cancellation aborts
//! the task, so no notification can fire after `cancel` returns.

use crate::device::Device;
use crate::sequencer::{Flow, Sequencer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct FaultWatch {
    handle: JoinHandle<()>,
}

impl FaultWatch {
    /// Subscribes to `device` and spawns the observer task. The watch stays
    /// armed after a trigger: every matching notification runs the fail
    /// script again until the watch is canceled.
    pub fn spawn(
        pv: &str,
        device: Arc<dyn Device>,
        trigger: f64,
        fail_script: PathBuf,
        sequencer: Sequencer,
    ) -> Self {
        let pv_name = pv.to_string();
        let mut receiver = device.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(value) if value == trigger => {
                        warn!(
                            pv = %pv_name,
                            value,
                            script = %fail_script.display(),
                            "fault condition reached, running fail script"
                        );
                        match sequencer.execute_script(&fail_script).await {
                            Ok(Flow::ExitRun) => {
                                // A concurrent flow cannot terminate the main
                                // task; the request is surfaced instead.
                                warn!(pv = %pv_name, "fail script requested exit, ending fault flow");
                            }
                            Ok(_) => {
                                info!(pv = %pv_name, "fail script finished");
                            }
                            Err(err) => {
                                error!(pv = %pv_name, error = %err, "fail script failed");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(pv = %pv_name, missed, "fault-watch lagged behind notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }

    /// Detaches the subscription. Aborting the task guarantees no further
    /// notification is observed once this returns.
    pub fn cancel(self) {
        self.handle.abort();
    }
}
