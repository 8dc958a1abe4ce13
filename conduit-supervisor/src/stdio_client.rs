//! Stdio JSON-RPC client (spec.md §4.1 "Stdio JSON-RPC client semantics"):
//! one writer task, one reader task, and one stderr-draining task per
//! child, with a `PendingCall` map correlating replies by `id`.
//!
//! Grounded on `axum-mcp`'s `StdioTransport` (stdin/stdout piping, line
//! framing, best-effort `Drop` cleanup) but reworked from a request/response
//! pair into a long-lived reader/writer split so many concurrent `Invoke`s
//! can be in flight against the same child, correlated by `id` the way
//! `axum-mcp`'s `SseTransport::pending_responses` correlates SSE replies.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_core::{GatewayError, GatewayResult, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Requests wrap at 2^53 (spec.md §4.1), the largest integer a JSON number
/// round-trips exactly through an `f64`-backed decoder.
const ID_WRAP: u64 = 1 << 53;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioClient {
    name: String,
    child: Mutex<Child>,
    write_tx: mpsc::UnboundedSender<JsonRpcRequest>,
    pending: PendingMap,
    next_id: AtomicU64,
    exited: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl StdioClient {
    /// Spawns `command`/`args` with `env` merged over the inherited parent
    /// environment (`spec.env` takes precedence, spec.md §4.1 "Spawn").
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        line_limit: usize,
    ) -> GatewayResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| GatewayError::unavailable(format!("spawn failed for '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::unavailable("child did not expose stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::unavailable("child did not expose stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GatewayError::unavailable("child did not expose stderr"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let exited = Arc::new(AtomicBool::new(false));

        let (write_tx, write_rx) = mpsc::unbounded_channel::<JsonRpcRequest>();
        let writer_task = tokio::spawn(writer_loop(name.to_string(), stdin, write_rx));
        let reader_task = tokio::spawn(reader_loop(
            name.to_string(),
            stdout,
            line_limit,
            pending.clone(),
            exited.clone(),
        ));
        let stderr_task = tokio::spawn(stderr_loop(name.to_string(), stderr));

        Ok(Self {
            name: name.to_string(),
            child: Mutex::new(child),
            write_tx,
            pending,
            next_id: AtomicU64::new(1),
            exited,
            reader_task,
            writer_task,
            stderr_task,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        // `try_lock` so a blocked caller never stalls a pid query; `None`
        // just means "ask again", never a correctness issue here.
        self.child.try_lock().ok().and_then(|c| c.id())
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if id >= ID_WRAP {
            self.next_id.store(1, Ordering::SeqCst);
        }
        id
    }

    /// Fire-and-forget notification (no `id`, no reply expected).
    pub fn notify(&self, method: impl Into<String>, params: Option<Value>) -> GatewayResult<()> {
        self.write_tx
            .send(JsonRpcRequest::notification(method, params))
            .map_err(|_| GatewayError::unavailable(format!("stdio writer for '{}' has exited", self.name)))
    }

    /// Sends a correlated request and awaits its reply or `deadline`,
    /// whichever comes first (spec.md §4.1 `Invoke`, §5 cancellation).
    pub async fn call(&self, method: impl Into<String>, params: Option<Value>, deadline: Duration) -> GatewayResult<JsonRpcResponse> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(GatewayError::unavailable(format!("child '{}' has exited", self.name)));
        }

        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::call(Value::from(id), method, params);
        if self.write_tx.send(request).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(GatewayError::unavailable(format!("stdio writer for '{}' has exited", self.name)));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_canceled)) => Err(GatewayError::internal("reply channel dropped before a response arrived")),
            Err(_elapsed) => {
                // Release the slot: a late reply for this id is simply
                // dropped by the reader loop (spec.md §5 "Cancellation").
                self.pending.lock().await.remove(&id);
                Err(GatewayError::Timeout(deadline))
            }
        }
    }

    /// `true` if the reader loop has observed EOF on stdout, i.e. the child
    /// has exited (spec.md §4.1 "Mid-session child exit").
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub async fn try_wait_exited(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(Some(_)))
    }

    /// Graceful termination: SIGTERM, wait up to `grace`, then SIGKILL
    /// (spec.md §4.1 `Stop`).
    pub async fn shutdown(&self, grace: Duration) -> GatewayResult<()> {
        self.reader_task.abort();
        self.writer_task.abort();
        self.stderr_task.abort();

        let mut child = self.child.lock().await;
        if let Some(pid) = child.id() {
            send_sigterm(pid);
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(_status)) => Ok(()),
            _ => {
                warn!(child = %self.name, "graceful stop timed out, sending SIGKILL");
                child
                    .start_kill()
                    .map_err(|e| GatewayError::internal(format!("force-kill failed: {e}")))?;
                child
                    .wait()
                    .await
                    .map_err(|e| GatewayError::internal(format!("waiting for killed child failed: {e}")))?;
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

async fn writer_loop(name: String, stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<JsonRpcRequest>) {
    let mut stdin = stdin;
    while let Some(request) = rx.recv().await {
        let line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(e) => {
                warn!(child = %name, error = %e, "failed to serialize outgoing request");
                continue;
            }
        };
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(child = %name, error = %e, "failed to write to child stdin, writer loop exiting");
            return;
        }
        if stdin.write_all(b"\n").await.is_err() || stdin.flush().await.is_err() {
            warn!(child = %name, "failed to flush child stdin, writer loop exiting");
            return;
        }
    }
}

/// Accumulates stdout byte-by-chunk instead of calling `read_line`, so the
/// `line_limit` cap (spec.md §6 "Stream lines MUST NOT exceed the
/// configured buffer") is enforced as bytes arrive rather than after an
/// unbounded `String` has already grown to hold one pathologically long,
/// newline-less line. Once a line crosses the limit its bytes are dropped
/// on the floor (not buffered) until the next `\n` resynchronizes framing.
async fn reader_loop(name: String, stdout: ChildStdout, line_limit: usize, pending: PendingMap, exited: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stdout);
    let mut line: Vec<u8> = Vec::new();
    let mut oversized = false;

    loop {
        let available = match reader.fill_buf().await {
            Ok(buf) => buf,
            Err(e) => {
                warn!(child = %name, error = %e, "error reading child stdout, read loop exiting");
                exited.store(true, Ordering::SeqCst);
                return;
            }
        };

        if available.is_empty() {
            debug!(child = %name, "stdout closed, child has exited");
            exited.store(true, Ordering::SeqCst);
            return;
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(newline_at) => {
                if !oversized {
                    line.extend_from_slice(&available[..newline_at]);
                }
                reader.consume(newline_at + 1);

                if oversized {
                    warn!(child = %name, limit = line_limit, "dropping oversized stdout line");
                    oversized = false;
                } else {
                    match std::str::from_utf8(&line) {
                        Ok(text) => route_line(&name, text, &pending).await,
                        Err(e) => warn!(child = %name, error = %e, "dropping non-UTF-8 stdout line"),
                    }
                }
                line.clear();
            }
            None => {
                let consumed = available.len();
                if !oversized && line.len() + available.len() > line_limit {
                    oversized = true;
                    line.clear();
                    warn!(child = %name, limit = line_limit, "stdout line exceeds limit, discarding until next newline");
                } else if !oversized {
                    line.extend_from_slice(available);
                }
                reader.consume(consumed);
            }
        }
    }
}

async fn route_line(name: &str, line: &str, pending: &PendingMap) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            // A corrupted line never poisons the registry; it just drops
            // whatever correlation it would have fulfilled (spec.md §7).
            warn!(child = %name, error = %e, "dropping malformed stdout line");
            return;
        }
    };

    let id = value.get("id").and_then(|v| v.as_u64());
    match id {
        Some(id) => {
            let sender = pending.lock().await.remove(&id);
            match sender {
                Some(sender) => {
                    if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) {
                        let _ = sender.send(response);
                    }
                }
                None => debug!(child = %name, id, "reply for unknown or already-timed-out request id"),
            }
        }
        None => debug!(child = %name, "server-initiated notification received, discarding"),
    }
}

async fn stderr_loop(name: String, stderr: tokio::process::ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return,
            Ok(_) => debug!(child = %name, stderr = line.trim(), "child stderr"),
            Err(_) => return,
        }
    }
}
