//! # Command Execution Module / 命令执行模块
//!
//! Spawns one child process, captures its interleaved stdout and stderr into
//! a single transcript, and enforces an optional timeout and a cancellation
//! token. Children are started in their own process group on unix so that
//! termination reaches every descendant, not just the direct child.
//!
//! 派生一个子进程，将其交错的 stdout 与 stderr 捕获为单一记录，
//! 并执行可选的超时与取消令牌。在 unix 上子进程位于独立的进程组中，
//! 以便终止信号能到达所有后代进程。

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Time a terminated process group gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);
/// Time allowed to drain the pipes after the child has exited.
/// Background grandchildren can hold the pipes open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a captured process ended.
/// 被捕获进程的结束方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own. `None` when it was killed by a signal.
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

impl Termination {
    pub fn success(self) -> bool {
        matches!(self, Termination::Exited(Some(0)))
    }
}

/// The outcome of [`run_captured`].
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub termination: Termination,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
}

/// Spawns `cmd`, captures its output and waits for it under the given limits.
///
/// # Arguments
/// * `cmd` - The command to run; stdio is overridden
/// * `timeout` - Maximum wall time, `None` for no limit
/// * `cancel` - Token that aborts the process when cancelled
/// * `echo` - Also print each output line to stdout as it arrives
///
/// # Returns
/// An `io::Error` only when the process cannot be spawned or awaited.
/// A timeout or cancellation is reported through [`Termination`].
///
/// 派生 `cmd`，捕获其输出并在给定限制下等待其结束。
/// 仅当进程无法派生或等待时返回 `io::Error`；超时与取消通过 [`Termination`] 报告。
pub async fn run_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    echo: bool,
) -> io::Result<CapturedRun> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stderr"))?;

    // Shared so that a partial transcript survives an abandoned drain.
    // 共享缓冲区，使放弃读取时仍能保留部分输出。
    let output = Arc::new(Mutex::new(String::new()));
    let mut reader = {
        let output = Arc::clone(&output);
        tokio::spawn(async move {
            let out = SplitStream::new(BufReader::new(stdout).split(b'\n'));
            let err = SplitStream::new(BufReader::new(stderr).split(b'\n'));
            let mut merged = out.merge(err);
            while let Some(Ok(bytes)) = merged.next().await {
                let line = String::from_utf8_lossy(&bytes);
                let line = line.trim_end_matches('\r');
                if echo {
                    println!("{line}");
                }
                let mut output = output.lock().await;
                output.push_str(line);
                output.push('\n');
            }
        })
    };

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let termination = tokio::select! {
        biased;
        _ = cancel.cancelled() => Termination::Cancelled,
        _ = &mut deadline => Termination::TimedOut,
        status = child.wait() => Termination::Exited(status?.code()),
    };

    if !matches!(termination, Termination::Exited(_)) {
        debug!(pid = ?child.id(), ?termination, "terminating process group");
        terminate(&mut child).await;
    }

    // A background grandchild can hold the pipes open indefinitely.
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
        reader.abort();
        warn!("output pipes still open after exit; transcript may be truncated");
    }
    let output = output.lock().await.clone();

    Ok(CapturedRun {
        termination,
        output,
    })
}

/// Terminates the child and everything it spawned.
///
/// On unix the whole process group receives `SIGTERM`, then `SIGKILL` if it
/// is still alive after a grace period. Elsewhere only the child is killed.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, "-TERM").await;
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            // The leader is gone; stragglers in the group still get killed.
            signal_group(pid, "-KILL").await;
            return;
        }
        signal_group(pid, "-KILL").await;
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill after termination failed");
    }
    let _ = child.wait().await;
}

#[cfg(unix)]
async fn signal_group(pid: u32, signal: &str) {
    let result = Command::new("kill")
        .arg(signal)
        .arg("--")
        .arg(format!("-{pid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        debug!(pid, signal, error = %e, "could not signal process group");
    }
}
