//! Scripted backend used by tests across the workspace: responses are
//! registered up front, no toolchain required.

use crate::backend::{Backend, BackendLauncher};
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use symkg_protocol::{BackendRequest, BackendResponse, QueryKind, QueryResult};

type ScriptKey = (QueryKind, String);

/// In-memory backend answering from a pre-registered script.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: StdMutex<HashMap<ScriptKey, QueryResult>>,
    failures: StdMutex<HashMap<ScriptKey, String>>,
    delay: StdMutex<Option<Duration>>,
    calls: StdMutex<Vec<ScriptKey>>,
    closed: AtomicBool,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result for (method, file).
    pub fn respond(&self, method: QueryKind, file: &str, result: QueryResult) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method, file.to_string()), result);
    }

    /// Make (method, file) answer with an error payload.
    pub fn fail(&self, method: QueryKind, file: &str, message: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method, file.to_string()), message.to_string());
    }

    /// Delay every response, for timeout tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    /// The (method, file) pairs requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(QueryKind, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn request(&self, request: BackendRequest) -> Result<BackendResponse> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SessionError::Unavailable("backend closed".to_string()));
        }

        let key = (request.method, request.file.clone());
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(BackendResponse::err(request.id, message.clone()));
        }

        let result = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        match result {
            Some(result) => Ok(BackendResponse::ok(request.id, result)),
            None => Ok(BackendResponse::err(
                request.id,
                format!("no scripted response for {:?} {}", request.method, request.file),
            )),
        }
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Launcher handing out a shared [`ScriptedBackend`], optionally failing
/// the first N launches to exercise the attach retry path.
pub struct ScriptedLauncher {
    backend: Arc<ScriptedBackend>,
    fail_remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl ScriptedLauncher {
    #[must_use]
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self {
            backend,
            fail_remaining: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_launches(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn launch_attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackendLauncher for ScriptedLauncher {
    async fn launch(&self, _root: &Path) -> Result<Arc<dyn Backend>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(SessionError::Unavailable(
                "scripted launch failure".to_string(),
            ));
        }
        Ok(self.backend.clone())
    }
}
