//! Tool server process
//!
//! Owns exactly one external helper process and its framed stdio streams.
//! Requests go to stdin, responses come back on stdout one JSON line at a
//! time, and stderr is drained for diagnostics only.
use super::error::{LaunchError, TransportError};
use super::types::ServerConfig;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Time a server gets to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

const STDERR_TAIL_LINES: usize = 50;

pub struct ToolServerProcess {
    server_id: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// Bytes of the frame currently being assembled
    partial: Vec<u8>,
    /// A timeout cut the previous frame; drop its tail when it shows up
    skip_partial_tail: bool,
    pid: Option<u32>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl ToolServerProcess {
    /// Spawn the configured command with piped stdio.
    ///
    /// The environment is inherited and overridden by `config.env`. The child
    /// is killed if this value is dropped without `stop`, so every exit path
    /// releases the process. No retries.
    pub fn start(config: &ServerConfig) -> Result<Self, LaunchError> {
        if config.command.trim().is_empty() {
            return Err(LaunchError::InvalidCommand {
                id: config.id.clone(),
            });
        }

        info!(
            target: "tool_server",
            server = %config.id,
            command = %config.command,
            args = ?config.args,
            "Starting tool server"
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            error!(target: "tool_server", server = %config.id, error = %e, "Failed to spawn tool server");
            LaunchError::from_spawn(&config.command, e)
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(LaunchError::MissingStdio("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(LaunchError::MissingStdio("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(LaunchError::MissingStdio("stderr"))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        spawn_stderr_drain(config.id.clone(), stderr, Arc::clone(&stderr_tail));

        let pid = child.id();
        debug!(target: "tool_server", server = %config.id, pid = ?pid, "Tool server spawned");

        Ok(Self {
            server_id: config.id.clone(),
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            partial: Vec::new(),
            skip_partial_tail: false,
            pid,
            stderr_tail,
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write one newline-terminated frame and flush
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.child.is_none() {
            return Err(TransportError::Io("process stopped".to_string()));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::Io("stdin closed".to_string()))?;

        stdin.write_all(frame).await.map_err(|e| {
            warn!(target: "tool_server", server = %self.server_id, error = %e, "Failed to write frame");
            TransportError::from(e)
        })?;
        if !frame.ends_with(b"\n") {
            stdin.write_all(b"\n").await?;
        }
        stdin.flush().await?;
        Ok(())
    }

    /// Wait for one newline-terminated frame on stdout.
    ///
    /// Returns the frame without its terminator. On timeout the bytes read so
    /// far are discarded and nothing is resent; EOF is an IO error.
    pub async fn receive(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        if self.child.is_none() {
            return Err(TransportError::Io("process stopped".to_string()));
        }

        let read = async {
            loop {
                let n = self.stdout.read_until(b'\n', &mut self.partial).await?;
                if n == 0 {
                    return Err(TransportError::Io("stdout closed".to_string()));
                }
                if !self.partial.ends_with(b"\n") {
                    continue;
                }

                let mut frame = std::mem::take(&mut self.partial);
                if self.skip_partial_tail {
                    self.skip_partial_tail = false;
                    debug!(target: "tool_server", server = %self.server_id, "Dropped tail of an abandoned frame");
                    continue;
                }
                frame.pop();
                if frame.ends_with(b"\r") {
                    frame.pop();
                }
                return Ok(frame);
            }
        };
        let outcome = timeout(wait, read).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                if !self.partial.is_empty() {
                    self.partial.clear();
                    self.skip_partial_tail = true;
                }
                Err(TransportError::Timeout(wait))
            }
        }
    }

    /// True once the child has exited or was stopped
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            None => true,
            Some(child) => !matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Last lines the server wrote to stderr
    pub fn recent_stderr(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// SIGTERM, wait up to `grace`, then kill. Idempotent.
    pub async fn stop(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        info!(target: "tool_server", server = %self.server_id, "Stopping tool server");

        // EOF on stdin is enough for most servers to exit on their own
        drop(self.stdin.take());

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(target: "tool_server", server = %self.server_id, status = %status, "Tool server exited");
            }
            Ok(Err(e)) => {
                warn!(target: "tool_server", server = %self.server_id, error = %e, "Wait failed; killing");
                let _ = child.kill().await;
            }
            Err(_) => {
                warn!(
                    target: "tool_server",
                    server = %self.server_id,
                    grace_ms = grace.as_millis() as u64,
                    "Tool server ignored SIGTERM; killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(target: "tool_server", server = %self.server_id, error = %e, "Kill failed");
                }
            }
        }
    }
}

fn spawn_stderr_drain(
    server_id: String,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "tool_server", server = %server_id, line = %line, "stderr");
            if let Ok(mut ring) = tail.lock() {
                if ring.len() == STDERR_TAIL_LINES {
                    ring.pop_front();
                }
                ring.push_back(line);
            }
        }
        debug!(target: "tool_server", server = %server_id, "Stderr reader exited");
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(id: &str, script: &str) -> ServerConfig {
        ServerConfig::new(id, "sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let cfg = ServerConfig::new("ghost", "definitely-not-a-real-binary-4821");
        match ToolServerProcess::start(&cfg) {
            Err(LaunchError::NotFound { command }) => {
                assert_eq!(command, "definitely-not-a-real-binary-4821")
            }
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let cfg = ServerConfig::new("blank", "  ");
        assert!(matches!(
            ToolServerProcess::start(&cfg),
            Err(LaunchError::InvalidCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_cat_echoes_frame() {
        let mut process = ToolServerProcess::start(&ServerConfig::new("cat", "cat")).unwrap();
        assert!(process.pid().is_some());

        process.send(br#"{"hello":"world"}"#).await.unwrap();
        let frame = process.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(frame, br#"{"hello":"world"}"#.to_vec());

        process.stop(Duration::from_secs(2)).await;
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_partial_frame_dropped_after_timeout() {
        // First half of a frame, a pause longer than the timeout, then the
        // rest followed by a complete frame.
        let mut process = ToolServerProcess::start(&shell(
            "slow",
            "read _; printf 'half'; sleep 1; printf 'tail\\n{\"ok\":1}\\n'; sleep 5",
        ))
        .unwrap();

        process.send(b"go").await.unwrap();
        let err = process.receive(Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));

        let frame = process.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(frame, br#"{"ok":1}"#.to_vec());
        process.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mut process = ToolServerProcess::start(&shell("quitter", "exit 0")).unwrap();
        let err = process.receive(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        process.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut process = ToolServerProcess::start(&shell("sleeper", "sleep 30")).unwrap();
        process.stop(Duration::from_secs(2)).await;
        process.stop(Duration::from_secs(2)).await;

        let err = process.send(b"{}").await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn test_stop_kills_after_grace_when_sigterm_ignored() {
        let mut process = ToolServerProcess::start(&shell(
            "stubborn",
            "trap '' TERM; echo armed; while :; do sleep 1; done",
        ))
        .unwrap();
        // The trap is installed once the first line arrives
        let armed = process.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(armed, b"armed".to_vec());

        let grace = Duration::from_millis(300);
        let started = std::time::Instant::now();
        process.stop(grace).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= grace);
        assert!(elapsed < grace + Duration::from_secs(3));
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let mut process =
            ToolServerProcess::start(&shell("noisy", "echo 'booting' >&2; sleep 5")).unwrap();
        let mut seen = false;
        for _ in 0..50 {
            if process.recent_stderr().iter().any(|l| l == "booting") {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(seen);
        process.stop(Duration::from_millis(500)).await;
    }
}
