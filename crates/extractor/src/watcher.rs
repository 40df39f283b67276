use crate::config::AnalysisConfig;
use crate::error::{ExtractorError, Result};
use crate::extractor::is_stale;
use crate::pipeline::AnalysisPipeline;
use crate::scanner::{FileScanner, IGNORED_SCOPES};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::time::{self, Instant};

/// Tuning for the change watcher.
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Per-file burst-collapse window.
    pub debounce: Duration,
    /// A file continuously changing still runs at least this often.
    pub max_batch_wait: Duration,
    /// Full-rescan period in degraded (no-notify) mode.
    pub rescan_interval: Duration,
    /// Concurrent re-extraction workers.
    pub worker_pool_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            max_batch_wait: Duration::from_secs(3),
            rescan_interval: Duration::from_secs(30),
            worker_pool_size: 4,
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub fn from_analysis_config(config: &AnalysisConfig) -> Self {
        Self {
            debounce: config.debounce(),
            rescan_interval: config.rescan_interval(),
            worker_pool_size: config.worker_pool_size,
            ..Self::default()
        }
    }
}

/// Broadcast after every completed (or failed) re-extraction task.
#[derive(Debug, Clone)]
pub struct ExtractionUpdate {
    pub file: String,
    pub revision: u64,
    pub success: bool,
    pub facts_upserted: usize,
    pub facts_pruned: usize,
    pub duration_ms: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Observable watcher state.
#[derive(Debug, Clone, Serialize)]
pub struct WatcherHealth {
    pub pending: usize,
    pub in_flight: usize,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// True when filesystem notification was unavailable and the watcher
    /// fell back to periodic rescans.
    pub degraded: bool,
}

impl WatcherHealth {
    fn initial(degraded: bool) -> Self {
        Self {
            pending: 0,
            in_flight: 0,
            consecutive_failures: 0,
            last_error: None,
            degraded,
        }
    }
}

enum WatcherCommand {
    Touch(PathBuf),
    Shutdown,
}

struct TaskDone {
    path: PathBuf,
    success: bool,
    error: Option<String>,
}

/// Watches an attached project and keeps the fact store current: content
/// changes bump the file's revision and enqueue a re-extraction task.
///
/// Tasks for the same file never run concurrently; bursts collapse into
/// one task; a failed task is retried exactly once.
#[derive(Clone)]
pub struct ChangeWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    command_tx: mpsc::Sender<WatcherCommand>,
    update_tx: broadcast::Sender<ExtractionUpdate>,
    health_tx: watch::Sender<WatcherHealth>,
    degraded: bool,
    _watcher: StdMutex<Option<RecommendedWatcher>>,
}

impl ChangeWatcher {
    /// Start watching the pipeline's project root.
    ///
    /// If the notification backend cannot initialize, the watcher degrades
    /// to periodic full rescans instead of failing.
    pub fn start(pipeline: Arc<AnalysisPipeline>, config: WatcherConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (update_tx, _) = broadcast::channel(64);
        let root = pipeline.root().to_path_buf();

        let (watcher, degraded) = match create_fs_watcher(&root, event_tx) {
            Ok(watcher) => (Some(watcher), false),
            Err(err) => {
                log::warn!(
                    "filesystem notification unavailable for {} ({err}); degrading to rescans every {:?}",
                    root.display(),
                    config.rescan_interval
                );
                (None, true)
            }
        };

        let (health_tx, _) = watch::channel(WatcherHealth::initial(degraded));

        tokio::spawn(watch_loop(
            pipeline,
            config,
            degraded,
            event_rx,
            command_rx,
            update_tx.clone(),
            health_tx.clone(),
        ));

        Ok(Self {
            inner: Arc::new(WatcherInner {
                command_tx,
                update_tx,
                health_tx,
                degraded,
                _watcher: StdMutex::new(watcher),
            }),
        })
    }

    /// Enqueue a file immediately, skipping the debounce window.
    pub async fn touch(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.inner
            .command_tx
            .send(WatcherCommand::Touch(path.into()))
            .await
            .map_err(|e| ExtractorError::Other(format!("watcher is stopped: {e}")))
    }

    /// Stop the watch loop and drain the queue. Idempotent; in-flight
    /// tasks finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.inner.command_tx.send(WatcherCommand::Shutdown).await;
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ExtractionUpdate> {
        self.inner.update_tx.subscribe()
    }

    #[must_use]
    pub fn health_snapshot(&self) -> WatcherHealth {
        self.inner.health_tx.subscribe().borrow().clone()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(WatcherCommand::Shutdown);
        }
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

#[allow(clippy::too_many_lines)]
async fn watch_loop(
    pipeline: Arc<AnalysisPipeline>,
    config: WatcherConfig,
    degraded: bool,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
    update_tx: broadcast::Sender<ExtractionUpdate>,
    health_tx: watch::Sender<WatcherHealth>,
) {
    let root = pipeline.root().to_path_buf();
    let mut queue = DebounceQueue::new(config.debounce, config.max_batch_wait);
    let mut in_flight: HashSet<PathBuf> = HashSet::new();
    let mut dirty_while_running: HashSet<PathBuf> = HashSet::new();
    let mut health = WatcherHealth::initial(degraded);

    let pool = Arc::new(Semaphore::new(config.worker_pool_size));
    let (done_tx, mut done_rx) = mpsc::channel::<TaskDone>(64);

    let mut rescan = time::interval(config.rescan_interval);
    rescan.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let next_deadline = queue.next_deadline();

        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        for path in event.paths {
                            if is_relevant_path(&root, &path) {
                                queue.record(path);
                            }
                        }
                    }
                    Err(err) => log::warn!("watcher error: {err}"),
                }
            }
            Some(command) = command_rx.recv() => {
                match command {
                    WatcherCommand::Touch(path) => queue.record_immediate(path),
                    WatcherCommand::Shutdown => break,
                }
            }
            Some(done) = done_rx.recv() => {
                in_flight.remove(&done.path);
                if done.success {
                    health.consecutive_failures = 0;
                } else {
                    health.consecutive_failures += 1;
                    health.last_error = done.error;
                }
                // Events that arrived mid-task get a fresh run.
                if dirty_while_running.remove(&done.path) {
                    queue.record_immediate(done.path);
                }
            }
            _ = rescan.tick(), if degraded => {
                // Degraded mode: enqueue everything; workers hash-skip the
                // unchanged files.
                let scanner = FileScanner::new(&root);
                for path in scanner.scan() {
                    queue.record(path);
                }
                for file in pipeline.tracked_files() {
                    let absolute = root.join(&file);
                    if !absolute.exists() {
                        queue.record(absolute);
                    }
                }
            }
            () = async {
                if let Some(deadline) = next_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if next_deadline.is_some() => {
                for path in queue.take_due(Instant::now()) {
                    if in_flight.contains(&path) {
                        dirty_while_running.insert(path);
                        continue;
                    }
                    in_flight.insert(path.clone());
                    tokio::spawn(run_extraction_task(
                        pipeline.clone(),
                        pool.clone(),
                        path,
                        done_tx.clone(),
                        update_tx.clone(),
                    ));
                }
            }
        }

        health.pending = queue.len();
        health.in_flight = in_flight.len();
        let _ = health_tx.send(health.clone());
    }

    log::info!("change watcher for {} stopped", root.display());
}

async fn run_extraction_task(
    pipeline: Arc<AnalysisPipeline>,
    pool: Arc<Semaphore>,
    path: PathBuf,
    done_tx: mpsc::Sender<TaskDone>,
    update_tx: broadcast::Sender<ExtractionUpdate>,
) {
    let Ok(_permit) = pool.acquire_owned().await else {
        return;
    };
    let started = Instant::now();
    let file = pipeline.relative_path(&path);

    let mut attempts = 0u32;
    let mut last_error: Option<String> = None;
    let mut outcome = None;

    while attempts < 2 {
        attempts += 1;
        match pipeline.analyze_path(&path).await {
            Ok(result) => {
                outcome = Some(result);
                break;
            }
            Err(err) => {
                let stale = is_stale(&err);
                log::warn!("re-extraction of {file} failed (attempt {attempts}): {err}");
                last_error = Some(err.to_string());
                // A stale session means the project detached; retrying
                // cannot succeed.
                if stale {
                    break;
                }
            }
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let success = outcome.is_some();
    let update = match outcome {
        Some(result) => ExtractionUpdate {
            file,
            revision: result.revision,
            success: true,
            facts_upserted: result.upserted.inserted + result.upserted.refreshed,
            facts_pruned: result.pruned,
            duration_ms,
            attempts,
            error: None,
        },
        None => ExtractionUpdate {
            file,
            revision: 0,
            success: false,
            facts_upserted: 0,
            facts_pruned: 0,
            duration_ms,
            attempts,
            error: last_error.clone(),
        },
    };

    let _ = update_tx.send(update);
    let _ = done_tx
        .send(TaskDone {
            path,
            success,
            error: last_error,
        })
        .await;
}

fn is_relevant_path(root: &Path, path: &Path) -> bool {
    if let Ok(relative) = path.strip_prefix(root) {
        for component in relative.components() {
            if let std::path::Component::Normal(name) = component {
                let lowered = name.to_string_lossy().to_lowercase();
                if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                    return false;
                }
                if lowered.starts_with('.') {
                    return false;
                }
            }
        }
    }
    FileScanner::is_candidate(path)
}

/// Per-file debounce queue: bursts to the same file collapse into one
/// deadline, bounded by a maximum batch wait so a hot file still runs.
struct DebounceQueue {
    debounce: Duration,
    max_batch: Duration,
    entries: HashMap<PathBuf, PendingEntry>,
}

struct PendingEntry {
    deadline: Instant,
    first_seen: Instant,
}

impl DebounceQueue {
    fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            entries: HashMap::new(),
        }
    }

    fn record(&mut self, path: PathBuf) {
        let now = Instant::now();
        match self.entries.get_mut(&path) {
            Some(entry) => {
                entry.deadline = (now + self.debounce).min(entry.first_seen + self.max_batch);
            }
            None => {
                self.entries.insert(
                    path,
                    PendingEntry {
                        deadline: now + self.debounce,
                        first_seen: now,
                    },
                );
            }
        }
    }

    fn record_immediate(&mut self, path: PathBuf) {
        let now = Instant::now();
        self.entries.insert(
            path,
            PendingEntry {
                deadline: now,
                first_seen: now,
            },
        );
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let due: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.entries.remove(path);
        }
        due
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
