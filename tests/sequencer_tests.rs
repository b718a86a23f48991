//! End-to-end tests of the script sequencer: loops, control flow, dispatch
//! recovery, fault-watches, and condition waits over a simulated axis.

use galscript::commands;
use galscript::config::WaitSettings;
use galscript::context::ExecutionContext;
use galscript::device::{Device, MockAxis};
use galscript::error::EngineError;
use galscript::sequencer::{Flow, Sequencer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    script_dir: PathBuf,
    sequencer: Sequencer,
    motor: Arc<MockAxis>,
    rbv: Arc<MockAxis>,
}

fn fixture() -> Fixture {
    let motor = Arc::new(MockAxis::new("galil"));
    let val = Arc::new(MockAxis::new("galil_val"));
    let rbv = Arc::new(MockAxis::new("galil_rbv"));
    let mut devices: HashMap<String, Arc<dyn Device>> = HashMap::new();
    devices.insert("galil".to_string(), motor.clone());
    devices.insert("galil_val".to_string(), val);
    devices.insert("galil_rbv".to_string(), rbv.clone());

    let dir = TempDir::new().unwrap();
    let script_dir = dir.path().to_path_buf();
    let wait = WaitSettings {
        poll_interval_ms: 5,
        ..WaitSettings::default()
    };
    let ctx = ExecutionContext::new(devices, script_dir.clone(), wait).unwrap();
    Fixture {
        _dir: dir,
        script_dir,
        sequencer: Sequencer::new(ctx),
        motor,
        rbv,
    }
}

fn write_script(fix: &Fixture, name: &str, contents: &str) -> PathBuf {
    let path = fix.script_dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn lines(script: &[&str]) -> Vec<String> {
    script.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_nested_loops_execute_inner_block_the_product_of_counts() {
    let fix = fixture();
    let script = write_script(&fix, "loops.txt", "l2\nl1\npr 1\nbg\nn\nn\n");
    let flow = fix.sequencer.execute_script(&script).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    // 2 x 1 iterations of a +1 relative move
    assert_eq!(fix.motor.position(), 2.0);
}

#[tokio::test]
async fn test_unknown_command_is_reported_and_execution_continues() {
    let fix = fixture();
    let script = write_script(&fix, "typo.txt", "frobnicate 1\npa 5\nbg\n");
    let flow = fix.sequencer.execute_script(&script).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(fix.motor.position(), 5.0);
}

#[tokio::test]
async fn test_unbalanced_loop_aborts_the_script() {
    let fix = fixture();
    let script = write_script(&fix, "unbalanced.txt", "l2\nt0\n");
    let result = fix.sequencer.execute_script(&script).await;
    assert!(matches!(result, Err(EngineError::LoopSyntax)));
}

#[tokio::test]
async fn test_missing_script_path_is_an_error() {
    let fix = fixture();
    let result = fix
        .sequencer
        .execute_script(Path::new("/nonexistent/script.txt"))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidScriptPath(_))));
}

#[tokio::test]
async fn test_stop_unwinds_the_current_script_only() {
    let fix = fixture();
    write_script(&fix, "sub.txt", "pa 5\nbg\nstop\npa 7\nbg\n");
    let parent = write_script(&fix, "parent.txt", "run sub.txt\npa 9\nbg\n");
    let flow = fix.sequencer.execute_script(&parent).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    // the sub-script stopped after moving to 5; the parent still ran
    assert_eq!(fix.motor.position(), 9.0);
}

#[tokio::test]
async fn test_exit_terminates_the_whole_run() {
    let fix = fixture();
    write_script(&fix, "sub.txt", "exit\n");
    let parent = write_script(&fix, "parent.txt", "run sub.txt\npa 9\nbg\n");
    let flow = fix.sequencer.execute_script(&parent).await.unwrap();
    assert_eq!(flow, Flow::ExitRun);
    assert_eq!(fix.motor.position(), 0.0);
}

#[tokio::test]
async fn test_failing_nested_script_does_not_abort_the_parent() {
    let fix = fixture();
    write_script(&fix, "sub.txt", "pa\n"); // missing argument: fatal to sub
    let parent = write_script(&fix, "parent.txt", "run sub.txt\npa 3\nbg\n");
    let flow = fix.sequencer.execute_script(&parent).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(fix.motor.position(), 3.0);
}

#[tokio::test]
async fn test_fault_watch_runs_fail_script_and_failifoff_detaches_it() {
    let fix = fixture();
    write_script(&fix, "fail.txt", "dp 77\n");
    let arm = lines(&[r#"failif "Galil RBV" 10 fail.txt"#]);
    fix.sequencer
        .execute_lines(&arm, Path::new("inline"))
        .await
        .unwrap();

    fix.rbv.inject(10.0);
    let mut triggered = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if fix.motor.position() == 77.0 {
            triggered = true;
            break;
        }
    }
    assert!(triggered, "fail script never ran");

    let disarm = lines(&[r#"failifoff "Galil RBV""#]);
    fix.sequencer
        .execute_lines(&disarm, Path::new("inline"))
        .await
        .unwrap();

    fix.motor.set_current_position(0.0).await.unwrap();
    fix.rbv.inject(10.0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fix.motor.position(), 0.0, "watch fired after failifoff");
}

#[tokio::test]
async fn test_non_trigger_values_do_not_fire_the_watch() {
    let fix = fixture();
    write_script(&fix, "fail.txt", "dp 77\n");
    let arm = lines(&[r#"failif "Galil RBV" 10 fail.txt"#]);
    fix.sequencer
        .execute_lines(&arm, Path::new("inline"))
        .await
        .unwrap();

    fix.rbv.inject(9.0);
    fix.rbv.inject(11.0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fix.motor.position(), 0.0);
    fix.sequencer.context().shutdown();
}

#[tokio::test]
async fn test_waitai_scales_raw_arguments_to_engineering_units() {
    let fix = fixture();
    fix.rbv.inject(7.0);
    // 5_000_000 counts / 1e6 = 5.0 units; readback is 7.0 so >= holds
    let wait = lines(&[r#"waitai "Galil RBV" >= 5000000 0 1"#]);
    let flow = fix
        .sequencer
        .execute_lines(&wait, Path::new("inline"))
        .await
        .unwrap();
    assert_eq!(flow, Flow::Continue);
}

#[tokio::test]
async fn test_waitdi_timeout_is_reported_not_fatal() {
    let fix = fixture();
    fix.rbv.inject(0.0);
    let wait = lines(&[r#"waitdi "Galil RBV" 1 0"#, "pa 4", "bg"]);
    let flow = fix
        .sequencer
        .execute_lines(&wait, Path::new("inline"))
        .await
        .unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(fix.motor.position(), 4.0);
}

#[tokio::test]
async fn test_wait_on_unmapped_pv_is_fatal_to_the_script() {
    let fix = fixture();
    let wait = lines(&[r#"waitai "No Such PV" >= 1 0 0"#]);
    let result = fix.sequencer.execute_lines(&wait, Path::new("inline")).await;
    assert!(matches!(result, Err(EngineError::UnmappedSignal(_))));
}

#[tokio::test]
async fn test_unknown_command_always_yields_command_not_found() {
    let fix = fixture();
    let result = commands::dispatch(&fix.sequencer, "bogus", &[], Path::new("inline")).await;
    assert!(matches!(result, Err(EngineError::CommandNotFound(name)) if name == "bogus"));
}

#[tokio::test]
async fn test_bare_timer_and_loop_names_fail_dispatch_loudly() {
    let fix = fixture();
    for name in ["t", "l"] {
        let result = commands::dispatch(&fix.sequencer, name, &[], Path::new("inline")).await;
        assert!(matches!(result, Err(EngineError::CommandNotFound(_))));
    }
}

#[tokio::test]
async fn test_comments_and_blank_lines_are_steps_without_effects() {
    let fix = fixture();
    let script = write_script(&fix, "quiet.txt", "# nothing here\n\npa 2\nbg\n\n");
    let flow = fix.sequencer.execute_script(&script).await.unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(fix.motor.position(), 2.0);
}

#[tokio::test]
async fn test_rearming_failif_replaces_the_previous_watch() {
    let fix = fixture();
    write_script(&fix, "first.txt", "dp 11\n");
    write_script(&fix, "second.txt", "dp 22\n");
    let arm = lines(&[
        r#"failif "Galil RBV" 10 first.txt"#,
        r#"failif "Galil RBV" 10 second.txt"#,
    ]);
    fix.sequencer
        .execute_lines(&arm, Path::new("inline"))
        .await
        .unwrap();

    fix.rbv.inject(10.0);
    let mut triggered = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let pos = fix.motor.position();
        if pos != 0.0 {
            assert_eq!(pos, 22.0, "replaced watch must win");
            triggered = true;
            break;
        }
    }
    assert!(triggered, "replacement watch never fired");
    fix.sequencer.context().shutdown();
}

#[tokio::test]
async fn test_negative_wait_timeout_is_invalid_argument() {
    let fix = fixture();
    let args = lines(&["Galil RBV", "1", "-1"]);
    let result = commands::dispatch(&fix.sequencer, "waitdi", &args, Path::new("inline")).await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidArgument { ref command, .. }) if command == "waitdi"
    ));
}

#[tokio::test]
async fn test_oversized_timer_is_invalid_argument() {
    let fix = fixture();
    // far beyond what a Duration can represent
    let script = lines(&["t99999999999999999999999"]);
    let result = fix
        .sequencer
        .execute_lines(&script, Path::new("inline"))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidArgument { ref command, .. }) if command == "t"
    ));
}
