//! Condition-wait engine: poll a signal until a comparison holds.
//!
//! The wait samples on a fixed cadence so it stays responsive and
//! cooperative; background tasks keep running while the flow is parked here.
//! A timeout does not abort the script: the engine reports
//! [`WaitOutcome::TimedOut`] and the caller decides the policy.

use crate::device::Device;
use crate::error::EngineResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Comparison operator for `waitai`/`waitdi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// Evaluates the comparison. Tolerance only participates in equality:
    /// `==` holds when `|value - target| <= tolerance` and `!=` is its
    /// negation; the ordered comparators ignore it.
    pub fn holds(self, value: f64, target: f64, tolerance: f64) -> bool {
        match self {
            Self::Eq => (value - target).abs() <= tolerance,
            Self::Ne => (value - target).abs() > tolerance,
            Self::Lt => value < target,
            Self::Le => value <= target,
            Self::Gt => value > target,
            Self::Ge => value >= target,
        }
    }
}

/// Everything needed to decide when a wait is over.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub comparator: Comparator,
    pub target: f64,
    pub tolerance: f64,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// Polls `device` every `poll` until the condition holds or the timeout
/// elapses. The first sample is taken immediately; the timeout is checked
/// after each sample, so `timeout == 0` still observes one sample.
pub async fn wait_for(
    device: &Arc<dyn Device>,
    spec: &WaitSpec,
    poll: Duration,
) -> EngineResult<WaitOutcome> {
    let started = Instant::now();
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let value = device.read().await?;
        if spec.comparator.holds(value, spec.target, spec.tolerance) {
            return Ok(WaitOutcome::Satisfied);
        }
        if let Some(timeout) = spec.timeout {
            if started.elapsed() >= timeout {
                return Ok(WaitOutcome::TimedOut);
            }
        }
    }
}
