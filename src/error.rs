//! Custom error types for the script engine.
//!
//! `EngineError` is the single error type threaded through parsing, dispatch,
//! and command execution. The variants split along the recovery policy:
//!
//! - `CommandNotFound` is recovered by the sequencer: it is reported and the
//!   next statement runs.
//! - `LoopSyntax` is fatal to the script being parsed.
//! - `InvalidArgument`, `UnmappedSignal`, and `Device` are fatal to the
//!   script that raised them; a parent script that invoked it via `run`
//!   reports the failure and continues.
//! - `Config`/`Configuration` only occur at startup, before any script runs.
//!
//! Script-level control flow (`stop`, `exit`) is not an error; see
//! [`crate::sequencer::Flow`].

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unrecognized command '{0}'")]
    CommandNotFound(String),

    #[error("'l' loop without matching 'n'")]
    LoopSyntax,

    #[error("Invalid arguments {args:?} for command '{command}'")]
    InvalidArgument { command: String, args: Vec<String> },

    #[error("Script path '{0}' is invalid or unreadable")]
    InvalidScriptPath(PathBuf),

    #[error("No device is mapped to signal '{0}'")]
    UnmappedSignal(String),

    #[error("Device '{0}' is missing from the device registry")]
    MissingDevice(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device error: {0}")]
    Device(#[from] anyhow::Error),
}
