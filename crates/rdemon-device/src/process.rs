//! Handle to a process spawned on a device

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rdemon_core::prelude::*;
use rdemon_core::{ProcessEvent, RemoteCommand};

const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to a running device process.
///
/// The process itself is owned by a background task that emits its output and
/// exactly one [`ProcessEvent::Exited`] on the event channel given at spawn
/// time. `RemoteProcess` keeps a kill channel to that task and an atomic flag
/// for synchronous `has_exited()` checks. Dropping the handle kills the
/// process.
pub struct RemoteProcess {
    /// Process ID on the device, if the device reports one
    pid: Option<u32>,
    /// One-shot sender that tells the owning task to kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the owning task once the process has exited.
    exited: Arc<AtomicBool>,
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl RemoteProcess {
    /// Assemble a handle from the parts a device implementation owns.
    ///
    /// The device must set `exited` and emit `ProcessEvent::Exited` once the
    /// process is gone, and must kill the process when `kill_rx` fires.
    pub fn from_parts(
        pid: Option<u32>,
        kill_tx: oneshot::Sender<()>,
        exited: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
        }
    }

    /// Spawn `command` as a local child process.
    ///
    /// Stdout and stderr are forwarded line by line; a dedicated wait task
    /// owns the `Child` and emits the real exit code.
    pub fn spawn_local(
        command: &RemoteCommand,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        info!("Spawning: {}", command);

        let mut cmd = Command::new(&command.executable);
        cmd.args(&command.arguments)
            .envs(&command.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound {
                    name: command.executable.clone(),
                }
            } else {
                Error::ProcessSpawn {
                    reason: e.to_string(),
                }
            }
        })?;

        let pid = child.id();
        info!("Process started with PID: {:?}", pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(Self::stdout_reader(stdout, event_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(Self::stderr_reader(stderr, event_tx.clone())));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            readers,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
        ));

        Ok(Self::from_parts(pid, kill_tx, exited))
    }

    /// Background task: owns `child`, waits for it to exit, emits `ProcessEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The process exits naturally (`child.wait()` resolves).
    /// 2. `kill_rx` fires: we kill the child first, then wait for it.
    ///
    /// Output already written by the process is drained before the exit event
    /// so consumers never see output after `Exited`.
    async fn wait_for_exit(
        mut child: Child,
        readers: Vec<JoinHandle<()>>,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, killing process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // A grandchild holding the pipes open must not stall the exit event.
        for reader in readers {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                debug!("Output reader still busy after exit, not waiting for it");
            }
        }

        // `has_exited()` must be true before anyone observes the event.
        exited.store(true, Ordering::Release);

        debug!("Sending ProcessEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    /// Read lines from stdout and send as `ProcessEvent::Stdout`.
    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
        Self::forward_lines(stdout, tx, "stdout", ProcessEvent::Stdout).await;
    }

    /// Read lines from stderr and send as `ProcessEvent::Stderr`.
    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessEvent>) {
        Self::forward_lines(stderr, tx, "stderr", ProcessEvent::Stderr).await;
    }

    /// Forward `stream` line by line until EOF.
    ///
    /// Invalid UTF-8 is replaced rather than ending the stream.
    async fn forward_lines<R>(
        stream: R,
        tx: mpsc::Sender<ProcessEvent>,
        name: &'static str,
        event: fn(String) -> ProcessEvent,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("{} read failed: {}", name, e);
                    break;
                }
            }

            let line = decode_line(&buf);
            trace!("{}: {}", name, line);

            if tx.send(event(line)).await.is_err() {
                debug!("{} channel closed", name);
                break;
            }
        }

        debug!("{} reader finished", name);
    }

    /// Ask the owning task to kill the process. Never blocks; a no-op once
    /// the process has exited or a kill was already requested.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            debug!("Requesting kill of process {:?}", self.pid);
            // The task may have already finished on its own.
            let _ = tx.send(());
        }
    }

    /// Non-blocking check backed by the flag the owning task sets.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

/// Lossy UTF-8 decode without the line terminator
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            debug!("RemoteProcess dropped while process may still be running");
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for_exit_code(rx: &mut mpsc::Receiver<ProcessEvent>) -> Option<Option<i32>> {
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(ProcessEvent::Exited { code })) => return Some(code),
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(_) => continue,
            }
        }
        None
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{FFFD} byte");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_output() {
        let (tx, mut rx) = mpsc::channel(16);
        let command = RemoteCommand::new("sh").args(["-c", "printf 'first\\n\\377\\nlast\\n'"]);
        let _process = RemoteProcess::spawn_local(&command, tx).expect("sh must be available");

        let mut lines = Vec::new();
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(ProcessEvent::Stdout(line))) => lines.push(line),
                Ok(Some(ProcessEvent::Exited { .. })) | Ok(None) => break,
                Ok(Some(_)) | Err(_) => continue,
            }
        }

        assert_eq!(lines, vec!["first", "\u{FFFD}", "last"]);
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let (tx, _rx) = mpsc::channel(16);
        let command = RemoteCommand::new("/nonexistent/rdemon-test-binary");
        let result = RemoteProcess::spawn_local(&command, tx);

        assert!(matches!(result, Err(Error::ExecutableNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_captured_on_normal_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let command = RemoteCommand::new("sh").args(["-c", "echo hello; exit 0"]);
        let _process = RemoteProcess::spawn_local(&command, tx).expect("sh must be available");

        let mut saw_stdout = false;
        let mut code = None;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(ProcessEvent::Stdout(line))) => {
                    assert_eq!(line, "hello");
                    saw_stdout = true;
                }
                Ok(Some(ProcessEvent::Exited { code: c })) => {
                    code = Some(c);
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_stdout, "stdout line was not forwarded");
        assert_eq!(code, Some(Some(0)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_captured_on_error_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let command = RemoteCommand::new("sh").args(["-c", "exit 42"]);
        let _process = RemoteProcess::spawn_local(&command, tx).expect("sh must be available");

        assert_eq!(wait_for_exit_code(&mut rx).await, Some(Some(42)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_long_running_process() {
        let (tx, mut rx) = mpsc::channel(16);
        let command = RemoteCommand::new("sh").args(["-c", "sleep 60"]);
        let mut process = RemoteProcess::spawn_local(&command, tx).expect("sh must be available");

        assert!(process.is_running());
        process.kill();
        // Second kill is a no-op
        process.kill();

        assert!(wait_for_exit_code(&mut rx).await.is_some());
        assert!(process.has_exited());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_environment_and_working_directory_applied() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut command =
            RemoteCommand::new("sh").args(["-c", "echo \"$RDEMON_TEST_VAR\"; pwd"]);
        command
            .environment
            .insert("RDEMON_TEST_VAR".to_string(), "marker".to_string());
        command.working_directory = Some(std::env::temp_dir());
        let _process = RemoteProcess::spawn_local(&command, tx).expect("sh must be available");

        let mut lines = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await
        {
            match event {
                ProcessEvent::Stdout(line) => lines.push(line),
                ProcessEvent::Exited { .. } => break,
                ProcessEvent::Stderr(_) => {}
            }
        }
        assert_eq!(lines.first().map(String::as_str), Some("marker"));
        assert_eq!(lines.len(), 2);
    }
}
