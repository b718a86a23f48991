//! Engine command handlers: sequencing, waits, logging registration,
//! fault-watches, and the advisory placeholders.
//!
//! Advisory commands (`email`, `lograte`, `plot`, `setao`, `setdo`, `var`)
//! must remain no-ops beyond their log line so script behavior stays
//! reproducible.

use super::{optional_duration, optional_f64, require, require_f64};
use crate::error::{EngineError, EngineResult};
use crate::faultwatch::FaultWatch;
use crate::sequencer::{Flow, Sequencer};
use crate::wait::{wait_for, Comparator, WaitOutcome, WaitSpec};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

pub(super) async fn dispatch(
    seq: &Sequencer,
    name: &str,
    args: &[String],
    script_path: &Path,
) -> EngineResult<Flow> {
    match name {
        "email" => email(args),
        "exit" => exit(),
        "failif" => failif(seq, args),
        "failifoff" => failifoff(seq, args),
        "log" => log_signal(seq, args),
        "lograte" => advisory("lograte", args),
        "plot" => advisory("plot", args),
        "print" => print(args),
        "run" => run(seq, args, script_path).await,
        "setao" => setao(args),
        "setdo" => setdo(args),
        "stop" => stop(),
        "var" => advisory("var", args),
        "waitai" => waitai(seq, args).await,
        "waitdi" => waitdi(seq, args).await,
        // `t<secs>` and `l<count>` are statement forms recognized by the
        // classifier; the bare names are not script commands.
        "t" | "l" => Err(EngineError::CommandNotFound(name.to_string())),
        _ => Err(EngineError::CommandNotFound(name.to_string())),
    }
}

/// Suspends the current flow. Shared by the `t<secs>` statement handler in
/// the sequencer. The classifier guarantees a non-negative number, but the
/// magnitude is script-controlled and may not fit in a `Duration`.
pub(crate) async fn timer_sleep(seconds: f64) -> EngineResult<()> {
    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|_| EngineError::InvalidArgument {
            command: "t".to_string(),
            args: vec![seconds.to_string()],
        })?;
    info!(seconds, "executing timer");
    tokio::time::sleep(duration).await;
    Ok(())
}

fn print(args: &[String]) -> EngineResult<Flow> {
    info!("print: {}", args.join(" "));
    Ok(Flow::Continue)
}

fn stop() -> EngineResult<Flow> {
    info!("stop: aborting current script flow");
    Ok(Flow::StopScript)
}

fn exit() -> EngineResult<Flow> {
    info!("exit: terminating the run");
    Ok(Flow::ExitRun)
}

fn email(args: &[String]) -> EngineResult<Flow> {
    let subject = require("email", args, 0)?;
    let recipients = args.get(2..).unwrap_or_default();
    // delivery is an external concern; the command only records the request
    info!(subject, ?recipients, "email requested");
    Ok(Flow::Continue)
}

fn setao(args: &[String]) -> EngineResult<Flow> {
    let pv = require("setao", args, 0)?;
    let value = require_f64("setao", args, 1)?;
    info!(pv, value, "setao (advisory)");
    Ok(Flow::Continue)
}

fn setdo(args: &[String]) -> EngineResult<Flow> {
    let pv = require("setdo", args, 0)?;
    let value = require_f64("setdo", args, 1)?;
    info!(pv, value, "setdo (advisory)");
    Ok(Flow::Continue)
}

fn advisory(command: &str, args: &[String]) -> EngineResult<Flow> {
    info!(command, ?args, "advisory command (no effect)");
    Ok(Flow::Continue)
}

fn log_signal(seq: &Sequencer, args: &[String]) -> EngineResult<Flow> {
    let ctx = seq.context();
    let name = require("log", args, 0)?;
    let device = ctx.resolve_signal(name)?;
    ctx.log_signal(name, device);
    info!(pv = name, "added signal to periodic log");
    Ok(Flow::Continue)
}

async fn run(seq: &Sequencer, args: &[String], script_path: &Path) -> EngineResult<Flow> {
    let name = require("run", args, 0)?;
    let nested = seq.resolve_script_path(name);
    info!(
        script = %nested.display(),
        parent = %script_path.display(),
        "running nested script"
    );
    match seq.execute_script(&nested).await {
        Ok(flow) => Ok(flow),
        Err(err) => {
            // fatal to the nested script only; the caller carries on
            error!(script = %nested.display(), error = %err, "nested script aborted");
            Ok(Flow::Continue)
        }
    }
}

fn failif(seq: &Sequencer, args: &[String]) -> EngineResult<Flow> {
    let ctx = seq.context();
    let pv = require("failif", args, 0)?;
    let trigger = require_f64("failif", args, 1)?;
    let script = require("failif", args, 2)?;
    let device = ctx.resolve_signal(pv)?;
    let fail_script = seq.resolve_script_path(script);
    info!(pv, trigger, script = %fail_script.display(), "arming fault-watch");
    let watch = FaultWatch::spawn(pv, device, trigger, fail_script, seq.clone());
    ctx.register_fault_watch(pv, watch);
    Ok(Flow::Continue)
}

fn failifoff(seq: &Sequencer, args: &[String]) -> EngineResult<Flow> {
    let pv = require("failifoff", args, 0)?;
    if seq.context().clear_fault_watch(pv) {
        info!(pv, "fault-watch disarmed");
    } else {
        info!(pv, "no active fault-watch to disarm");
    }
    Ok(Flow::Continue)
}

async fn waitai(seq: &Sequencer, args: &[String]) -> EngineResult<Flow> {
    let ctx = seq.context();
    let pv = require("waitai", args, 0)?;
    let op = require("waitai", args, 1)?;
    let comparator = Comparator::parse(op).ok_or_else(|| EngineError::InvalidArgument {
        command: "waitai".to_string(),
        args: args.to_vec(),
    })?;
    // raw analog arguments arrive in controller counts; scale to units
    let divisor = ctx.wait.analog_unit_divisor;
    let target = require_f64("waitai", args, 2)? / divisor;
    let tolerance = optional_f64("waitai", args, 3)?.unwrap_or(0.0);
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(EngineError::InvalidArgument {
            command: "waitai".to_string(),
            args: args.to_vec(),
        });
    }
    let tolerance = tolerance / divisor;
    let timeout = optional_duration("waitai", args, 4)?;
    let spec = WaitSpec {
        comparator,
        target,
        tolerance,
        timeout,
    };
    await_condition(seq, "waitai", pv, spec).await
}

async fn waitdi(seq: &Sequencer, args: &[String]) -> EngineResult<Flow> {
    let pv = require("waitdi", args, 0)?;
    let target = require_f64("waitdi", args, 1)?;
    let timeout = optional_duration("waitdi", args, 2)?;
    let spec = WaitSpec {
        comparator: Comparator::Eq,
        target,
        tolerance: 0.0,
        timeout,
    };
    await_condition(seq, "waitdi", pv, spec).await
}

async fn await_condition(
    seq: &Sequencer,
    command: &str,
    pv: &str,
    spec: WaitSpec,
) -> EngineResult<Flow> {
    let ctx = seq.context();
    let device = ctx.resolve_signal(pv)?;
    let poll = Duration::from_millis(ctx.wait.poll_interval_ms);
    info!(command, pv, target = spec.target, "waiting for condition");
    match wait_for(&device, &spec, poll).await? {
        WaitOutcome::Satisfied => info!(command, pv, "condition satisfied"),
        // timeout is reported, not fatal
        WaitOutcome::TimedOut => warn!(command, pv, "wait timed out before condition held"),
    }
    Ok(Flow::Continue)
}
