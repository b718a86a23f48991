//! Core library for the galscript engine.
//!
//! A line-oriented scripting engine that sequences motion-controller
//! operations: timers, counted loops, sub-script invocation, staged motion
//! setpoints, conditional waits, asynchronous fault-watches, and periodic
//! telemetry logging, all driven over an async device abstraction.

pub mod commands;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod faultwatch;
pub mod logger;
pub mod script;
pub mod sequencer;
pub mod wait;

pub use config::Settings;
pub use context::{ExecutionContext, MotionMode};
pub use device::{Device, MockAxis};
pub use error::{EngineError, EngineResult};
pub use logger::PeriodicLogger;
pub use sequencer::{Flow, Sequencer};
pub use wait::{Comparator, WaitOutcome, WaitSpec};
