//! Running one toolchain step as a child process.
//!
//! Each step runs in its own process group (unix) so that timeout and
//! cancellation can take down everything the tool spawned, not just the
//! direct child. `latexmk` in particular forks the engine and biber.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::recipe::ToolStep;

/// How long to keep draining pipes after the child is gone.
///
/// Grandchildren that escaped the kill may hold the pipes open.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to start `{0}`: {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("failed to wait for `{0}`: {1}")]
    Io(String, #[source] std::io::Error),
}

#[derive(Debug)]
pub enum Exit {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
pub struct StepRun {
    pub exit: Exit,
    /// stdout followed by stderr.
    pub output: String,
    pub duration: Duration,
}

/// Run `step` in `cwd`, bounded by `timeout` and by `cancel` turning true.
pub async fn run_step(
    step: &ToolStep,
    cwd: &Path,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<StepRun, StepError> {
    let started = Instant::now();

    let mut command = Command::new(&step.program);
    command
        .args(&step.args)
        .envs(&step.env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|err| StepError::Spawn(step.program.clone(), err))?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let waited = tokio::select! {
        status = child.wait() => {
            Exit::Exited(status.map_err(|err| StepError::Io(step.program.clone(), err))?)
        }
        _ = tokio::time::sleep(timeout) => Exit::TimedOut,
        _ = wait_cancelled(cancel) => Exit::Cancelled,
    };

    if !matches!(waited, Exit::Exited(_)) {
        crate::debug!("build"; "killing `{}` ({:?})", step.program, waited);
        kill_tree(&mut child).await;
    }

    let mut output = collect(stdout).await;
    let err = collect(stderr).await;
    if !err.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&err);
    }

    Ok(StepRun {
        exit: waited,
        output,
        duration: started.elapsed(),
    })
}

/// Resolve once `cancel` becomes true. Never resolves if the sender is gone.
pub async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

/// Kill the child and every process in its group.
async fn kill_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        #[cfg(unix)]
        let _ = Command::new("kill")
            .args(["-s", "KILL", "--", &format!("-{pid}")])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        #[cfg(windows)]
        let _ = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sh(script: &str) -> ToolStep {
        ToolStep {
            name: "sh".into(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let (_tx, mut rx) = watch::channel(false);
        let run = run_step(
            &sh("echo out; echo err >&2; exit 3"),
            Path::new("."),
            Duration::from_secs(10),
            &mut rx,
        )
        .await
        .unwrap();

        let Exit::Exited(status) = run.exit else {
            panic!("expected exit, got {:?}", run.exit);
        };
        assert_eq!(status.code(), Some(3));
        assert_eq!(run.output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut step = sh("echo \"$GREETING\"; pwd");
        step.env.insert("GREETING".into(), "hi".into());
        let (_tx, mut rx) = watch::channel(false);

        let run = run_step(&step, temp.path(), Duration::from_secs(10), &mut rx)
            .await
            .unwrap();
        assert!(run.output.starts_with("hi\n"));
        let cwd = temp.path().canonicalize().unwrap();
        assert!(run.output.contains(cwd.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let (_tx, mut rx) = watch::channel(false);
        let run = run_step(
            &sh("sleep 30 & sleep 30; wait"),
            Path::new("."),
            Duration::from_millis(200),
            &mut rx,
        )
        .await
        .unwrap();

        assert!(matches!(run.exit, Exit::TimedOut));
        assert!(run.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let run = run_step(&sh("sleep 30"), Path::new("."), Duration::from_secs(60), &mut rx)
            .await
            .unwrap();
        assert!(matches!(run.exit, Exit::Cancelled));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (_tx, mut rx) = watch::channel(false);
        let step = ToolStep {
            name: "ghost".into(),
            program: "texwatch-no-such-binary".into(),
            args: vec![],
            env: BTreeMap::new(),
        };
        let err = run_step(&step, Path::new("."), Duration::from_secs(1), &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Spawn(..)));
    }
}
