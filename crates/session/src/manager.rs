use crate::backend::{Backend, BackendLauncher};
use crate::error::{Result, SessionError};
use crate::limits::session_concurrency_from_env;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use symkg_protocol::{BackendRequest, Position, QueryKind, QueryResult};
use tokio::time::timeout;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Tuning knobs for one manager instance.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Hard bound on any single backend query.
    pub query_timeout: Duration,
    /// Per-session cap on in-flight backend requests. Excess callers wait
    /// (backpressure); requests are never dropped.
    pub max_in_flight: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_in_flight: session_concurrency_from_env(DEFAULT_MAX_IN_FLIGHT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// Capability handle for one attached project session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    root: PathBuf,
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

struct SessionInner {
    backend: Arc<dyn Backend>,
    permits: Arc<tokio::sync::Semaphore>,
    root: PathBuf,
}

/// Owns one live backend session per attached project root and brokers
/// introspection queries to it.
pub struct SessionManager {
    launcher: Arc<dyn BackendLauncher>,
    options: SessionOptions,
    sessions: StdMutex<HashMap<SessionId, Arc<SessionInner>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    #[must_use]
    pub fn new(launcher: Arc<dyn BackendLauncher>, options: SessionOptions) -> Self {
        Self {
            launcher,
            options,
            sessions: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Arc<SessionInner>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an analysis session for `project_root`.
    ///
    /// A failed launch is retried once with a fresh backend before
    /// `Unavailable` is surfaced.
    pub async fn attach(&self, project_root: impl AsRef<Path>) -> Result<SessionHandle> {
        let root = project_root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(SessionError::Unavailable(format!(
                "project root does not exist: {}",
                root.display()
            )));
        }

        let backend = match self.launcher.launch(&root).await {
            Ok(backend) => backend,
            Err(first) => {
                log::warn!(
                    "backend failed to initialize for {}: {first}; restarting once",
                    root.display()
                );
                self.launcher.launch(&root).await.map_err(|second| {
                    SessionError::Unavailable(format!(
                        "backend failed twice for {}: {second}",
                        root.display()
                    ))
                })?
            }
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let inner = Arc::new(SessionInner {
            backend,
            permits: Arc::new(tokio::sync::Semaphore::new(self.options.max_in_flight)),
            root: root.clone(),
        });
        self.sessions().insert(id, inner);

        log::info!("attached session {id:?} at {}", root.display());
        Ok(SessionHandle { id, root })
    }

    /// Run one introspection query against the session's backend.
    ///
    /// Not retried internally: a failure may mean the file is permanently
    /// unsupported, and only the caller can tell.
    pub async fn query(
        &self,
        handle: &SessionHandle,
        file: &str,
        position: Option<Position>,
        method: QueryKind,
    ) -> Result<QueryResult> {
        let session = self
            .sessions()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| SessionError::Stale(handle.root.display().to_string()))?;

        // Bounded in-flight requests per session: waiting here is the
        // backpressure, and a closed semaphore means the session detached
        // while we queued.
        let _permit = session
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SessionError::Stale(handle.root.display().to_string()))?;

        let request = BackendRequest {
            id: 0,
            method,
            file: file.to_string(),
            position,
        };

        let response = match timeout(
            self.options.query_timeout,
            session.backend.request(request),
        )
        .await
        {
            Err(_) => {
                return Err(SessionError::QueryTimeout {
                    method,
                    file: file.to_string(),
                    timeout_ms: self.options.query_timeout.as_millis() as u64,
                })
            }
            Ok(result) => result?,
        };

        match (response.result, response.error) {
            (Some(result), _) => Ok(result),
            (None, Some(message)) => Err(SessionError::Backend(message)),
            (None, None) => Err(SessionError::Backend("empty backend response".to_string())),
        }
    }

    /// Close the session and release backend resources. Idempotent.
    ///
    /// Queued callers waiting on the request semaphore fail with `Stale`;
    /// in-flight queries are left to finish or time out.
    pub async fn detach(&self, handle: &SessionHandle) {
        let removed = self.sessions().remove(&handle.id);
        match removed {
            Some(session) => {
                session.permits.close();
                session.backend.shutdown().await;
                log::info!("detached session at {}", session.root.display());
            }
            None => log::debug!("detach on already-detached session {:?}", handle.id),
        }
    }

    #[must_use]
    pub fn is_attached(&self, handle: &SessionHandle) -> bool {
        self.sessions().contains_key(&handle.id)
    }

    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ScriptedBackend, ScriptedLauncher};
    use pretty_assertions::assert_eq;
    use symkg_protocol::{Location, SymbolInfo, SymbolKind};

    fn check_symbol() -> SymbolInfo {
        SymbolInfo {
            name: "check".to_string(),
            qualified_name: None,
            kind: SymbolKind::Function,
            location: Location {
                file: "a.py".to_string(),
                start_line: 1,
                end_line: 4,
            },
            children: Vec::new(),
        }
    }

    fn scripted() -> (Arc<ScriptedBackend>, Arc<ScriptedLauncher>) {
        let backend = Arc::new(ScriptedBackend::new());
        let launcher = Arc::new(ScriptedLauncher::new(backend.clone()));
        (backend, launcher)
    }

    #[tokio::test]
    async fn attach_query_detach_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let (backend, launcher) = scripted();
        backend.respond(
            QueryKind::DocumentSymbols,
            "a.py",
            QueryResult::Symbols(vec![check_symbol()]),
        );

        let manager = SessionManager::new(launcher, SessionOptions::default());
        let handle = manager.attach(temp.path()).await.unwrap();
        assert!(manager.is_attached(&handle));

        let result = manager
            .query(&handle, "a.py", None, QueryKind::DocumentSymbols)
            .await
            .unwrap();
        assert_eq!(result, QueryResult::Symbols(vec![check_symbol()]));

        manager.detach(&handle).await;
        assert!(!manager.is_attached(&handle));
    }

    #[tokio::test]
    async fn query_after_detach_is_stale() {
        let temp = tempfile::tempdir().unwrap();
        let (_, launcher) = scripted();
        let manager = SessionManager::new(launcher, SessionOptions::default());

        let handle = manager.attach(temp.path()).await.unwrap();
        manager.detach(&handle).await;
        // Idempotent: a second detach is a no-op.
        manager.detach(&handle).await;

        let err = manager
            .query(&handle, "a.py", None, QueryKind::Definition)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Stale(_)));
    }

    #[tokio::test]
    async fn attach_restarts_backend_once_before_failing() {
        let temp = tempfile::tempdir().unwrap();
        let (_, launcher) = scripted();
        launcher.fail_next_launches(1);

        let manager = SessionManager::new(launcher.clone(), SessionOptions::default());
        let handle = manager.attach(temp.path()).await.unwrap();
        assert!(manager.is_attached(&handle));
        assert_eq!(launcher.launch_attempts(), 2);
    }

    #[tokio::test]
    async fn attach_surfaces_unavailable_after_two_failures() {
        let temp = tempfile::tempdir().unwrap();
        let (_, launcher) = scripted();
        launcher.fail_next_launches(2);

        let manager = SessionManager::new(launcher.clone(), SessionOptions::default());
        let err = manager.attach(temp.path()).await.unwrap_err();
        assert!(matches!(err, SessionError::Unavailable(_)));
        assert_eq!(launcher.launch_attempts(), 2);
    }

    #[tokio::test]
    async fn attach_rejects_missing_root() {
        let (_, launcher) = scripted();
        let manager = SessionManager::new(launcher, SessionOptions::default());
        let err = manager.attach("/definitely/not/a/project").await.unwrap_err();
        assert!(matches!(err, SessionError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let temp = tempfile::tempdir().unwrap();
        let (backend, launcher) = scripted();
        backend.respond(
            QueryKind::References,
            "a.py",
            QueryResult::Locations(Vec::new()),
        );
        backend.set_delay(Duration::from_secs(60));

        let options = SessionOptions {
            query_timeout: Duration::from_millis(250),
            max_in_flight: 2,
        };
        let manager = SessionManager::new(launcher, options);
        let handle = manager.attach(temp.path()).await.unwrap();

        let err = manager
            .query(&handle, "a.py", None, QueryKind::References)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::QueryTimeout { .. }));
    }

    #[tokio::test]
    async fn backend_error_payload_is_surfaced() {
        let temp = tempfile::tempdir().unwrap();
        let (backend, launcher) = scripted();
        backend.fail(QueryKind::CallHierarchy, "binary.bin", "unsupported file");

        let manager = SessionManager::new(launcher, SessionOptions::default());
        let handle = manager.attach(temp.path()).await.unwrap();

        let err = manager
            .query(&handle, "binary.bin", None, QueryKind::CallHierarchy)
            .await
            .unwrap_err();
        match err {
            SessionError::Backend(message) => assert_eq!(message, "unsupported file"),
            other => panic!("expected backend error, got {other}"),
        }
    }
}
