//! Command dispatch: two disjoint, case-sensitive-lowercase tables.
//!
//! Engine commands are resolved first, then the Galil-style device
//! mnemonics; anything else is `CommandNotFound`. Handlers have explicit,
//! statically-typed signatures — each takes exactly the pieces it needs
//! (arguments, shared context, sequencer, invoking script path), so a
//! side-effect-free handler like `print` never touches the context.

pub mod engine;
pub mod motor;

use crate::error::{EngineError, EngineResult};
use crate::sequencer::{Flow, Sequencer};
use std::path::Path;
use std::time::Duration;

/// Engine command names. `t` and `l` are internal: the classifier recognizes
/// their `t<secs>`/`l<count>` line forms and the sequencer invokes the
/// handlers directly, so the bare names are not resolvable from a script.
pub const ENGINE_COMMANDS: [&str; 17] = [
    "email", "exit", "failif", "failifoff", "l", "log", "lograte", "plot", "print", "run",
    "setao", "setdo", "stop", "t", "var", "waitai", "waitdi",
];

/// Galil-style device command mnemonics.
pub const MOTOR_COMMANDS: [&str; 41] = [
    "ac", "af", "ba", "bg", "bi", "bl", "bm", "bt", "bz", "cc", "ce", "cn", "dc", "dp", "er",
    "fa", "fe", "fl", "fv", "hm", "hv", "ib", "iht", "il", "kd", "ki", "kp", "ld", "mo", "mt",
    "op", "pa", "pr", "pv", "sc", "sh", "sp", "st", "ta", "tp", "xq",
];

/// Resolves and runs one tokenized command.
pub async fn dispatch(
    sequencer: &Sequencer,
    name: &str,
    args: &[String],
    script_path: &Path,
) -> EngineResult<Flow> {
    if ENGINE_COMMANDS.contains(&name) {
        return engine::dispatch(sequencer, name, args, script_path).await;
    }
    if MOTOR_COMMANDS.contains(&name) {
        return motor::dispatch(sequencer.context(), name, args).await;
    }
    Err(EngineError::CommandNotFound(name.to_string()))
}

pub(crate) fn require<'a>(command: &str, args: &'a [String], index: usize) -> EngineResult<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| EngineError::InvalidArgument {
            command: command.to_string(),
            args: args.to_vec(),
        })
}

pub(crate) fn require_f64(command: &str, args: &[String], index: usize) -> EngineResult<f64> {
    require(command, args, index)?
        .parse()
        .map_err(|_| EngineError::InvalidArgument {
            command: command.to_string(),
            args: args.to_vec(),
        })
}

/// Parses an optional trailing numeric argument. Absence is tolerated;
/// a present-but-malformed value is not.
pub(crate) fn optional_f64(
    command: &str,
    args: &[String],
    index: usize,
) -> EngineResult<Option<f64>> {
    match args.get(index) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| EngineError::InvalidArgument {
                command: command.to_string(),
                args: args.to_vec(),
            }),
    }
}

/// Parses an optional timeout in seconds. Negative, non-finite, and
/// overflowing values are rejected; scripts must not be able to panic the
/// engine through a duration argument.
pub(crate) fn optional_duration(
    command: &str,
    args: &[String],
    index: usize,
) -> EngineResult<Option<Duration>> {
    match optional_f64(command, args, index)? {
        None => Ok(None),
        Some(seconds) => Duration::try_from_secs_f64(seconds)
            .map(Some)
            .map_err(|_| EngineError::InvalidArgument {
                command: command.to_string(),
                args: args.to_vec(),
            }),
    }
}
