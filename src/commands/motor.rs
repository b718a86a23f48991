//! Device command handlers: the Galil-style two/three-letter mnemonics.
//!
//! `pa`/`pr`/`sp` stage motion parameters in the shared context and `bg`
//! commits them (velocity first, then the move). The mnemonics with no
//! mapped device operation are advisory stubs and must stay print-only.

use super::require_f64;
use crate::context::{ExecutionContext, MotionMode};
use crate::error::EngineResult;
use crate::sequencer::Flow;
use std::sync::Arc;
use tracing::info;

pub(super) async fn dispatch(
    ctx: &Arc<ExecutionContext>,
    name: &str,
    args: &[String],
) -> EngineResult<Flow> {
    match name {
        "pa" => {
            let position = require_f64("pa", args, 0)?;
            ctx.stage_position(MotionMode::Absolute, position);
            info!(position, "staged absolute move");
        }
        "pr" => {
            let position = require_f64("pr", args, 0)?;
            ctx.stage_position(MotionMode::Relative, position);
            info!(position, "staged relative move");
        }
        "sp" => {
            let speed = require_f64("sp", args, 0)?;
            ctx.stage_speed(speed);
            info!(speed, "staged speed");
        }
        "bg" => {
            let staging = ctx.staged();
            let motor = ctx.motor()?;
            motor.set_velocity(staging.speed).await?;
            motor
                .move_to(staging.position, staging.mode == MotionMode::Relative)
                .await?;
            info!(
                position = staging.position,
                speed = staging.speed,
                relative = staging.mode == MotionMode::Relative,
                "began staged motion"
            );
        }
        "hm" => {
            info!("homing axis");
            ctx.motor()?.home().await?;
        }
        "st" | "sc" | "mo" => {
            info!(command = name, "stopping axis");
            ctx.motor()?.stop().await?;
        }
        "dp" => {
            let position = require_f64("dp", args, 0)?;
            ctx.motor()?.set_current_position(position).await?;
            info!(position, "defined current position");
        }
        "tp" => {
            let position = ctx.motor()?.read().await?;
            info!(position, "tell position");
        }
        _ => {
            // unmapped mnemonics are reproducible no-ops
            info!(command = name, ?args, "advisory device command (no effect)");
        }
    }
    Ok(Flow::Continue)
}
