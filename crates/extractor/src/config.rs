use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use symkg_session::BackendCommand;
use symkg_store::project_data_dir;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Pipeline configuration: backend selection, timeouts, and watcher tuning.
///
/// Loaded from `<root>/.symkg/config.toml` when present, then overridden by
/// `SYMKG_*` environment variables. Every field has a default, so a project
/// with no configuration still analyzes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Backend executable, launched in the project root.
    pub backend_program: String,
    pub backend_args: Vec<String>,

    /// Hard bound on a single backend query.
    pub query_timeout_ms: u64,
    /// Per-session cap on in-flight backend requests.
    pub session_concurrency: usize,

    /// Concurrent re-extraction workers.
    pub worker_pool_size: usize,
    /// Per-file burst-collapse window.
    pub debounce_ms: u64,
    /// Full-rescan period when filesystem notification is unavailable.
    pub rescan_interval_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend_program: "symkg-backend".to_string(),
            backend_args: Vec::new(),
            query_timeout_ms: 10_000,
            session_concurrency: 4,
            worker_pool_size: 4,
            debounce_ms: 500,
            rescan_interval_secs: 30,
        }
    }
}

impl AnalysisConfig {
    /// Load the project's configuration, applying environment overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let path = project_data_dir(root).join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.clamp();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(program) = std::env::var("SYMKG_BACKEND") {
            let trimmed = program.trim();
            if !trimmed.is_empty() {
                self.backend_program = trimmed.to_string();
            }
        }
        override_u64(&mut self.query_timeout_ms, "SYMKG_QUERY_TIMEOUT_MS");
        override_usize(&mut self.session_concurrency, "SYMKG_SESSION_CONCURRENCY");
        override_usize(&mut self.worker_pool_size, "SYMKG_WORKER_POOL_SIZE");
        override_u64(&mut self.debounce_ms, "SYMKG_DEBOUNCE_MS");
        override_u64(&mut self.rescan_interval_secs, "SYMKG_RESCAN_INTERVAL_SECS");
    }

    fn clamp(&mut self) {
        self.query_timeout_ms = self.query_timeout_ms.clamp(100, 120_000);
        self.session_concurrency = self.session_concurrency.clamp(1, 16);
        self.worker_pool_size = self.worker_pool_size.clamp(1, 16);
        self.debounce_ms = self.debounce_ms.clamp(50, 10_000);
        self.rescan_interval_secs = self.rescan_interval_secs.clamp(5, 3_600);
    }

    #[must_use]
    pub fn backend_command(&self) -> BackendCommand {
        BackendCommand::new(self.backend_program.clone(), self.backend_args.clone())
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }
}

fn override_u64(slot: &mut u64, var: &str) {
    if let Some(value) = std::env::var(var).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = value;
    }
}

fn override_usize(slot: &mut usize, var: &str) {
    if let Some(value) = std::env::var(var).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let config = AnalysisConfig::load(temp.path()).unwrap();
        assert_eq!(config.backend_program, "symkg-backend");
        assert_eq!(config.worker_pool_size, 4);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let temp = tempdir().unwrap();
        let dir = project_data_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            "backend_program = \"pyls-shim\"\nworker_pool_size = 2\ndebounce_ms = 200\n",
        )
        .unwrap();

        let config = AnalysisConfig::load(temp.path()).unwrap();
        assert_eq!(config.backend_program, "pyls-shim");
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.debounce(), Duration::from_millis(200));
        // Untouched fields keep defaults.
        assert_eq!(config.query_timeout_ms, 10_000);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let temp = tempdir().unwrap();
        let dir = project_data_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            "worker_pool_size = 999\ndebounce_ms = 1\nrescan_interval_secs = 0\n",
        )
        .unwrap();

        let config = AnalysisConfig::load(temp.path()).unwrap();
        assert_eq!(config.worker_pool_size, 16);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.rescan_interval_secs, 5);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = tempdir().unwrap();
        let dir = project_data_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), "worker_pool_size = \"many\"").unwrap();
        assert!(AnalysisConfig::load(temp.path()).is_err());
    }
}
