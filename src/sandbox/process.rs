use std::{
    os::unix::process::CommandExt,
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use anyhow::Context;
use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinHandle,
};

use crate::sandbox::SandboxResult;

/// How long pipe readers may keep draining after the child is gone.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Bytes read from one output stream so far.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

/// Runs `cmd` to completion or until `timeout` elapses.
///
/// The child is placed in its own process group. Whatever is left of that
/// group once the child exits or times out is killed, so nothing it forked
/// outlives the run. Standard input gets `stdin` followed by EOF, or
/// `/dev/null` when there is no input.
pub async fn run_supervised(
    mut cmd: std::process::Command,
    stdin: Option<&str>,
    timeout: Duration,
    max_output_bytes: usize,
) -> anyhow::Result<SandboxResult> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.process_group(0);
    let mut cmd = Command::from(cmd);
    cmd.kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd.spawn().context("failed to spawn sandbox command")?;
    let pid = child.id();

    if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
        let bytes = input.as_bytes().to_vec();
        tokio::spawn(async move {
            // The program may exit without reading; a broken pipe is fine.
            let _ = pipe.write_all(&bytes).await;
            let _ = pipe.shutdown().await;
        });
    }

    let stdout = child.stdout.take().context("missing stdout pipe")?;
    let stderr = child.stderr.take().context("missing stderr pipe")?;
    let stdout_capture = SharedCapture::default();
    let stderr_capture = SharedCapture::default();
    let stdout_task = tokio::spawn(read_limited(stdout, max_output_bytes, stdout_capture.clone()));
    let stderr_task = tokio::spawn(read_limited(stderr, max_output_bytes, stderr_capture.clone()));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Background processes left behind still hold the pipes.
            kill_group(pid);
            (exit_code(status), false)
        }
        Ok(Err(err)) => {
            kill_tree(&mut child, pid).await;
            return Err(err).context("failed to wait on sandbox command");
        }
        Err(_) => {
            kill_tree(&mut child, pid).await;
            (-1, true)
        }
    };

    let stdout = collect(stdout_task, &stdout_capture, "stdout").await;
    let stderr = collect(stderr_task, &stderr_capture, "stderr").await;

    Ok(SandboxResult {
        stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
        exit_code,
        duration_ms: started.elapsed().as_millis(),
        timed_out,
        truncated: stdout.truncated || stderr.truncated,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn kill_group(pid: Option<u32>) {
    if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }
}

async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    let _ = child.kill().await;
}

fn lock(capture: &SharedCapture) -> MutexGuard<'_, Captured> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits for a reader to hit EOF, then hands back what it read. A pipe held
/// open past the grace period keeps the bytes read up to that point.
async fn collect(task: JoinHandle<()>, capture: &SharedCapture, stream: &'static str) -> Captured {
    let abort = task.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(stream, error = %err, "output reader failed");
        }
        Err(_) => {
            abort.abort();
            tracing::warn!(stream, "output pipe still open after exit, keeping what was read");
        }
    }
    std::mem::take(&mut *lock(capture))
}

/// Reads until EOF, keeping at most `limit` bytes. Keeps draining past the
/// limit so the writer never blocks on a full pipe.
async fn read_limited<R>(mut reader: R, limit: usize, capture: SharedCapture)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let mut captured = lock(&capture);
        let remaining = limit.saturating_sub(captured.bytes.len());
        if n > remaining {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..remaining.min(n)]);
    }
}
