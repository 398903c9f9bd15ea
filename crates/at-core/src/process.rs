use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// ProcessHandle
// ---------------------------------------------------------------------------

/// Shared handle to a live worker process.
///
/// The `Child` itself is owned by the task that waits on it (see
/// [`ProcessControl`]); this handle only carries what other components need:
/// the stdin pipe, a kill switch and an exit flag. Cloning is cheap.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    kill_tx: Arc<watch::Sender<bool>>,
    exited_rx: watch::Receiver<bool>,
}

/// The exit watcher's side of a [`ProcessHandle`].
pub struct ProcessControl {
    kill_rx: watch::Receiver<bool>,
    exited_tx: watch::Sender<bool>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, stdin: Option<ChildStdin>) -> (Self, ProcessControl) {
        let (kill_tx, kill_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        let handle = Self {
            pid,
            stdin: Arc::new(Mutex::new(stdin)),
            kill_tx: Arc::new(kill_tx),
            exited_rx,
        };
        (handle, ProcessControl { kill_rx, exited_tx })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write `line` plus a trailing newline to the child's stdin, giving up
    /// after `limit`.
    ///
    /// The stdin lock is held for the whole write so concurrent senders never
    /// interleave within a line. Waiting for the lock counts against `limit`.
    /// If the write itself runs out of time the pipe may hold a partial line,
    /// so stdin is closed and later sends fail with `BrokenPipe`.
    pub async fn send_line(&self, line: &str, limit: Duration) -> io::Result<()> {
        let started = Instant::now();
        let mut guard = tokio::time::timeout(limit, self.stdin.lock())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "stdin busy"))?;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))?;

        let remaining = limit.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, write_line(stdin, line)).await {
            Ok(result) => result,
            Err(_) => {
                guard.take();
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "stdin write timed out, pipe closed",
                ))
            }
        }
    }

    /// Drop our end of the stdin pipe so the child sees EOF.
    pub async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    /// Ask the exit watcher to force-kill the process.
    pub fn kill(&self) {
        self.kill_tx.send_replace(true);
    }

    pub fn has_exited(&self) -> bool {
        *self.exited_rx.borrow()
    }

    /// Resolves once the exit watcher has finished recording the exit.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited_rx.clone();
        // A dropped sender means the watcher is gone, which only happens
        // after it has marked the exit or the runtime is shutting down.
        let _ = rx.wait_for(|exited| *exited).await;
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl ProcessControl {
    /// Resolves when some holder of the handle calls [`ProcessHandle::kill`].
    pub async fn kill_requested(&mut self) {
        let requested = self.kill_rx.wait_for(|kill| *kill).await.is_ok();
        if !requested {
            // Every handle is gone; nobody can ask for a kill anymore.
            std::future::pending::<()>().await;
        }
    }

    /// Flag the process as exited, waking every `wait_exited` caller.
    pub fn mark_exited(self) {
        self.exited_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
