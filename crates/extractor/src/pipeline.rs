use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::extractor::{Extractor, PartialExtraction};
use crate::revision::RevisionTracker;
use crate::scanner::FileScanner;
use crate::stats::ExtractionStats;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use symkg_session::{SessionHandle, SessionManager};
use symkg_store::{FactStore, Symbol, UpsertSummary};

/// Result of analyzing (or removing) one file.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub file: String,
    pub revision: u64,
    /// False when the content hash was unchanged and extraction was skipped.
    pub changed: bool,
    pub upserted: UpsertSummary,
    pub pruned: usize,
    pub diagnostics: Vec<PartialExtraction>,
}

/// One attached project: root, session handle, tracked files with their
/// revisions and symbols, and the store the extracted facts land in.
///
/// Extraction itself is stateless; everything that survives a pass lives
/// here or in the store.
pub struct AnalysisPipeline {
    root: PathBuf,
    project: String,
    manager: Arc<SessionManager>,
    handle: SessionHandle,
    store: Arc<FactStore>,
    extractor: Extractor,
    revisions: RevisionTracker,
    symbols: StdMutex<HashMap<String, Vec<Symbol>>>,
}

impl AnalysisPipeline {
    /// Attach a session for `root` and build the pipeline around it.
    pub async fn attach(
        manager: Arc<SessionManager>,
        store: Arc<FactStore>,
        root: impl AsRef<Path>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let project = root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());

        let handle = manager.attach(&root).await?;
        let extractor = Extractor::new(manager.clone(), project.clone());

        Ok(Self {
            root,
            project,
            manager,
            handle,
            store,
            extractor,
            revisions: RevisionTracker::new(),
            symbols: StdMutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FactStore> {
        &self.store
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Project-relative path string used as fact provenance.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Analyze one file: hash-skip when unchanged, otherwise extract at the
    /// next revision, merge the facts, and prune the stale ones. A deleted
    /// file has all of its facts pruned and its symbols dropped.
    pub async fn analyze_path(&self, path: &Path) -> Result<FileOutcome> {
        let file = self.relative_path(path);

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.remove_file(&file));
            }
            Err(err) => return Err(err.into()),
        };

        let Some(revision) = self.revisions.observe(&file, &content) else {
            return Ok(FileOutcome {
                revision: self.revisions.current(&file).unwrap_or(0),
                file,
                changed: false,
                ..FileOutcome::default()
            });
        };

        let text = String::from_utf8_lossy(&content);
        let outcome = match self
            .extractor
            .extract(&self.handle, &file, &text, revision)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                // The bumped revision was consumed without landing facts;
                // make sure the next observation re-extracts.
                self.revisions.invalidate(&file);
                return Err(err);
            }
        };

        for diagnostic in &outcome.diagnostics {
            log::warn!("partial extraction: {diagnostic}");
        }

        let upserted = self.store.upsert(outcome.facts)?;
        let pruned = self.store.prune(&file, revision);

        // Symbols are superseded en masse at the new revision.
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file.clone(), outcome.symbols);

        Ok(FileOutcome {
            file,
            revision,
            changed: true,
            upserted,
            pruned,
            diagnostics: outcome.diagnostics,
        })
    }

    fn remove_file(&self, file: &str) -> FileOutcome {
        let pruned = self.store.prune(file, u64::MAX);
        self.revisions.forget(file);
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file);
        if pruned > 0 {
            log::info!("removed {pruned} facts for deleted file {file}");
        }
        FileOutcome {
            file: file.to_string(),
            revision: 0,
            changed: pruned > 0,
            pruned,
            ..FileOutcome::default()
        }
    }

    /// Scan the project and analyze every candidate file. Per-file errors
    /// are recorded, not fatal: the rest of the project still lands.
    pub async fn analyze_project(&self) -> Result<ExtractionStats> {
        let started = Instant::now();
        let mut stats = ExtractionStats::new();

        let scanner = FileScanner::new(&self.root);
        for path in scanner.scan() {
            match self.analyze_path(&path).await {
                Ok(outcome) => {
                    if outcome.changed {
                        stats.add_file(
                            outcome.upserted.inserted + outcome.upserted.refreshed,
                            self.symbols_for(&outcome.file).len(),
                            outcome.diagnostics.len(),
                        );
                    }
                }
                Err(err) => {
                    log::error!("failed to analyze {}: {err}", path.display());
                    stats.add_error(format!("{}: {err}", path.display()));
                }
            }
        }

        stats.time_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "analyzed {} files ({} facts, {} symbols) in {}ms",
            stats.files,
            stats.facts,
            stats.symbols,
            stats.time_ms
        );
        Ok(stats)
    }

    #[must_use]
    pub fn symbols_for(&self, file: &str) -> Vec<Symbol> {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tracked_files(&self) -> Vec<String> {
        self.revisions.tracked_files()
    }

    #[must_use]
    pub fn current_revision(&self, file: &str) -> Option<u64> {
        self.revisions.current(file)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.manager.is_attached(&self.handle)
    }

    /// Close the project's session. In-flight queries finish or time out;
    /// queued ones fail with a stale-session error.
    pub async fn detach(&self) {
        self.manager.detach(&self.handle).await;
    }

    /// Convenience constructor wiring the configured stdio backend.
    pub async fn attach_with_config(
        store: Arc<FactStore>,
        root: impl AsRef<Path>,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let launcher = Arc::new(symkg_session::StdioLauncher::new(config.backend_command()));
        let options = symkg_session::SessionOptions {
            query_timeout: config.query_timeout(),
            max_in_flight: config.session_concurrency,
        };
        let manager = Arc::new(SessionManager::new(launcher, options));
        Self::attach(manager, store, root).await
    }
}
