//! Script sequencer: the top-level driver that walks statements, recurses
//! for loops and sub-scripts, and is the re-entry point for both the `run`
//! command and fault-watch callbacks.
//!
//! One engine entry point, [`Sequencer::execute_script`], serves every flow:
//! the main script invokes it directly, `run` and loop bodies recurse into
//! it synchronously, and fault-watches call it from their own spawned tasks.
//! Recursion through an async fn requires boxing, hence the `BoxFuture`
//! return types.

use crate::commands::{self, engine};
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::script::{classify, find_loop_end, Statement};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Control signal produced by statement execution.
///
/// `StopScript` unwinds the script it was raised in; `ExitRun` propagates
/// through every enclosing script and terminates the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    StopScript,
    ExitRun,
}

/// Cheaply cloneable handle to the execution engine. Clones share the same
/// execution context.
#[derive(Clone)]
pub struct Sequencer {
    ctx: Arc<ExecutionContext>,
}

impl Sequencer {
    pub fn new(ctx: Arc<ExecutionContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Resolves a script name against the configured script directory.
    pub fn resolve_script_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.ctx.script_dir.join(path)
        }
    }

    /// Loads and executes one script. A `stop` inside the script unwinds
    /// only this script: the caller observes `Flow::Continue`.
    pub fn execute_script<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, EngineResult<Flow>> {
        Box::pin(async move {
            if !path.is_file() {
                return Err(EngineError::InvalidScriptPath(path.to_path_buf()));
            }
            let text = tokio::fs::read_to_string(path).await?;
            let lines: Vec<String> = text.lines().map(str::to_string).collect();
            info!(script = %path.display(), statements = lines.len(), "executing script");
            match self.execute_lines(&lines, path).await? {
                Flow::StopScript => {
                    info!(script = %path.display(), "script stopped");
                    Ok(Flow::Continue)
                }
                flow => Ok(flow),
            }
        })
    }

    /// Executes a block of raw lines. Loop bodies re-enter this method, so
    /// nested loops are resolved by the same depth-counted matching at every
    /// level.
    pub fn execute_lines<'a>(
        &'a self,
        lines: &'a [String],
        script_path: &'a Path,
    ) -> BoxFuture<'a, EngineResult<Flow>> {
        Box::pin(async move {
            let mut index = 0;
            while index < lines.len() {
                match classify(&lines[index]) {
                    Statement::Comment => {}
                    Statement::Blank => {
                        // a blank line is still a step; keep ordering fair
                        tokio::task::yield_now().await;
                    }
                    Statement::Timer(seconds) => {
                        engine::timer_sleep(seconds).await?;
                    }
                    Statement::LoopStart(count) => {
                        let end = find_loop_end(lines, index)?;
                        let body = &lines[index + 1..end];
                        for iteration in 1..=count {
                            info!(iteration, count, "loop iteration");
                            match self.execute_lines(body, script_path).await? {
                                Flow::Continue => {}
                                flow => return Ok(flow),
                            }
                        }
                        index = end;
                    }
                    Statement::LoopEnd => {
                        // an 'n' with no open loop is reported and skipped
                        warn!(line = index + 1, "unmatched 'n' ignored");
                    }
                    Statement::Command { name, args } => {
                        match commands::dispatch(self, &name, &args, script_path).await {
                            Ok(Flow::Continue) => {}
                            Ok(flow) => return Ok(flow),
                            Err(EngineError::CommandNotFound(command)) => {
                                // recovered locally: report and keep going
                                error!(command = %command, line = index + 1, "unrecognized command");
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
                index += 1;
            }
            Ok(Flow::Continue)
        })
    }
}
