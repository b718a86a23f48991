//! Shared execution context: device registry, motion staging, logged-signal
//! and fault-watch registries.
//!
//! Exactly one context exists per top-level run. The sequencer, the periodic
//! logger, and every fault-watch flow share the same `Arc<ExecutionContext>`;
//! the mutable pieces each sit behind their own mutex with short critical
//! sections (no guard is ever held across an await point).

use crate::config::WaitSettings;
use crate::device::Device;
use crate::error::{EngineError, EngineResult};
use crate::faultwatch::FaultWatch;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Internal key of the primary motion axis.
pub const MOTOR_DEVICE: &str = "galil";

/// Devices that must be present in the registry for a run to start.
pub const REQUIRED_DEVICES: [&str; 3] = ["galil", "galil_val", "galil_rbv"];

/// How `bg` interprets the staged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Absolute,
    Relative,
}

/// Write-then-commit staging registers set by `pa`/`pr`/`sp`, consumed by `bg`.
#[derive(Debug, Clone, Copy)]
pub struct MotionStaging {
    pub mode: MotionMode,
    pub position: f64,
    pub speed: f64,
}

impl Default for MotionStaging {
    fn default() -> Self {
        Self {
            mode: MotionMode::Absolute,
            position: 0.0,
            speed: 1_000_000.0,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ExecutionContext {
    devices: HashMap<String, Arc<dyn Device>>,
    /// Script-facing PV display names to internal device keys. Fixed at
    /// context creation.
    device_mapping: HashMap<String, String>,
    staging: Mutex<MotionStaging>,
    /// Insertion-ordered; the periodic logger reads this fresh on every tick.
    logged_signals: Mutex<Vec<(String, Arc<dyn Device>)>>,
    fault_watches: Mutex<HashMap<String, FaultWatch>>,
    pub script_dir: PathBuf,
    pub wait: WaitSettings,
}

impl ExecutionContext {
    /// Validates the registry and builds the shared context. The PV mapping
    /// mirrors the instrument's readback/setpoint signals.
    pub fn new(
        devices: HashMap<String, Arc<dyn Device>>,
        script_dir: PathBuf,
        wait: WaitSettings,
    ) -> EngineResult<Arc<Self>> {
        for required in REQUIRED_DEVICES {
            if !devices.contains_key(required) {
                return Err(EngineError::MissingDevice(required.to_string()));
            }
        }
        let device_mapping = HashMap::from([
            ("Galil RBV".to_string(), "galil_rbv".to_string()),
            ("Galil VAL".to_string(), "galil_val".to_string()),
        ]);
        Ok(Arc::new(Self {
            devices,
            device_mapping,
            staging: Mutex::new(MotionStaging::default()),
            logged_signals: Mutex::new(Vec::new()),
            fault_watches: Mutex::new(HashMap::new()),
            script_dir,
            wait,
        }))
    }

    /// The primary motion axis.
    pub fn motor(&self) -> EngineResult<Arc<dyn Device>> {
        self.devices
            .get(MOTOR_DEVICE)
            .cloned()
            .ok_or_else(|| EngineError::MissingDevice(MOTOR_DEVICE.to_string()))
    }

    /// Resolves a script-facing PV display name to its device handle.
    pub fn resolve_signal(&self, pv: &str) -> EngineResult<Arc<dyn Device>> {
        let key = self
            .device_mapping
            .get(pv)
            .ok_or_else(|| EngineError::UnmappedSignal(pv.to_string()))?;
        self.devices
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::MissingDevice(key.clone()))
    }

    /// Snapshot of the staging registers for `bg`.
    pub fn staged(&self) -> MotionStaging {
        *lock(&self.staging)
    }

    pub fn stage_position(&self, mode: MotionMode, position: f64) {
        let mut staging = lock(&self.staging);
        staging.mode = mode;
        staging.position = position;
    }

    pub fn stage_speed(&self, speed: f64) {
        lock(&self.staging).speed = speed;
    }

    /// Registers a signal for periodic logging. Re-logging a name replaces
    /// its handle but keeps the original column position.
    pub fn log_signal(&self, name: &str, device: Arc<dyn Device>) {
        let mut signals = lock(&self.logged_signals);
        if let Some(entry) = signals.iter_mut().find(|(n, _)| n == name) {
            entry.1 = device;
        } else {
            signals.push((name.to_string(), device));
        }
    }

    /// Snapshot of the logged signals in insertion order.
    pub fn logged_signals(&self) -> Vec<(String, Arc<dyn Device>)> {
        lock(&self.logged_signals).clone()
    }

    /// Installs a fault-watch under its PV name, silently replacing (and
    /// canceling) any prior watch on the same name.
    pub fn register_fault_watch(&self, pv: &str, watch: FaultWatch) {
        if let Some(previous) = lock(&self.fault_watches).insert(pv.to_string(), watch) {
            previous.cancel();
        }
    }

    /// Detaches the watch registered under `pv`. Returns false when none was
    /// active.
    pub fn clear_fault_watch(&self, pv: &str) -> bool {
        match lock(&self.fault_watches).remove(pv) {
            Some(watch) => {
                watch.cancel();
                true
            }
            None => false,
        }
    }

    /// Detaches every active fault-watch. Called at run teardown.
    pub fn shutdown(&self) {
        let watches: Vec<_> = lock(&self.fault_watches).drain().collect();
        for (pv, watch) in watches {
            info!(pv = %pv, "detaching fault-watch");
            watch.cancel();
        }
    }
}
