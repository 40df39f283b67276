use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use symkg_protocol::{BackendRequest, BackendResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tokio::task::JoinHandle;

/// A semantic-analysis backend for one project root.
///
/// Implementations must be safe to call from multiple workers; request
/// ids are assigned internally and responses are matched by id.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn request(&self, request: BackendRequest) -> Result<BackendResponse>;

    /// Release backend resources. Idempotent.
    async fn shutdown(&self);
}

/// Launches a backend for a project root. Lets tests substitute a scripted
/// backend for the real child process.
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    async fn launch(&self, root: &Path) -> Result<Arc<dyn Backend>>;
}

/// Command line used to start a backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BackendCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Launcher spawning a [`StdioBackend`] child process in the project root.
pub struct StdioLauncher {
    command: BackendCommand,
}

impl StdioLauncher {
    #[must_use]
    pub fn new(command: BackendCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl BackendLauncher for StdioLauncher {
    async fn launch(&self, root: &Path) -> Result<Arc<dyn Backend>> {
        let backend = StdioBackend::spawn(&self.command, root).await?;
        Ok(Arc::new(backend))
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<BackendResponse>>;

/// Backend speaking newline-delimited JSON over a child process's stdio.
///
/// One request per line in, one response per line out. A reader task
/// demultiplexes responses to per-request oneshot channels; when the child
/// exits, all waiters fail with `Unavailable`.
pub struct StdioBackend {
    stdin: TokioMutex<ChildStdin>,
    // `None` once the backend is closed; new requests are rejected.
    pending: Arc<StdMutex<Option<PendingMap>>>,
    child: StdMutex<Option<Child>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl StdioBackend {
    pub async fn spawn(command: &BackendCommand, root: &Path) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SessionError::Unavailable(format!("failed to spawn {}: {e}", command.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Unavailable("backend stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Unavailable("backend stdout not captured".to_string()))?;

        let pending: Arc<StdMutex<Option<PendingMap>>> =
            Arc::new(StdMutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(read_responses(stdout, pending.clone()));

        Ok(Self {
            stdin: TokioMutex::new(stdin),
            pending,
            child: StdMutex::new(Some(child)),
            reader: StdMutex::new(Some(reader)),
            next_id: AtomicU64::new(0),
        })
    }
}

async fn read_responses(
    stdout: tokio::process::ChildStdout,
    pending: Arc<StdMutex<Option<PendingMap>>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response: BackendResponse = match serde_json::from_str(line) {
                    Ok(response) => response,
                    Err(err) => {
                        log::warn!("discarding malformed backend line: {err}");
                        continue;
                    }
                };
                let sender = {
                    let mut guard = pending.lock().unwrap_or_else(PoisonError::into_inner);
                    guard
                        .as_mut()
                        .and_then(|map| map.remove(&response.id))
                };
                match sender {
                    // The waiter may have timed out and gone away; that is
                    // not an error.
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => log::debug!("backend response {} has no waiter", response.id),
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!("backend stdout read failed: {err}");
                break;
            }
        }
    }
    // Child exited or stdout broke: fail every outstanding request.
    let mut guard = pending.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = None;
}

#[async_trait]
impl Backend for StdioBackend {
    async fn request(&self, mut request: BackendRequest) -> Result<BackendResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        request.id = id;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(map) => {
                    map.insert(id, tx);
                }
                None => {
                    return Err(SessionError::Unavailable("backend closed".to_string()));
                }
            }
        }

        let line = serde_json::to_string(&request)?;
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        rx.await.map_err(|_| {
            SessionError::Unavailable("backend exited before responding".to_string())
        })
    }

    async fn shutdown(&self) {
        {
            let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = None;
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = child {
            if let Err(err) = child.start_kill() {
                log::debug!("backend already exited: {err}");
            }
        }
    }
}
