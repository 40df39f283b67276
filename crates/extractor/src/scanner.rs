use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Scanner for files worth analyzing in a project (.gitignore aware).
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Scan the project for source and manifest files, sorted for a
    /// deterministic analysis order.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > MAX_FILE_SIZE_BYTES {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                MAX_FILE_SIZE_BYTES
                            );
                            continue;
                        }
                    }

                    if !Self::is_candidate(path) {
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} analyzable files", files.len());
        files
    }

    /// Source code or dependency manifest.
    #[must_use]
    pub fn is_candidate(path: &Path) -> bool {
        Self::is_source_file(path) || Self::is_manifest_file(path)
    }

    #[must_use]
    pub fn is_source_file(path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            let ext = ext.to_lowercase();
            return SOURCE_EXTENSIONS.iter().any(|candidate| candidate == &ext);
        }
        false
    }

    /// Dependency manifests feed the `dependencies`/`features` sub-graphs.
    #[must_use]
    pub fn is_manifest_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                MANIFEST_FILE_NAMES
                    .iter()
                    .any(|candidate| name.eq_ignore_ascii_case(candidate))
            })
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

pub(crate) const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    ".cache",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    "build",
    "dist",
    "coverage",
    // data / vendor
    "vendor",
    "third_party",
    "third-party",
];

pub(crate) const MANIFEST_FILE_NAMES: &[&str] = &[
    "requirements.txt",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
];

const MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyw", "js", "mjs", "cjs", "ts", "tsx", "jsx", "go", "java", "kt", "rb", "c", "h",
    "cpp", "cc", "hpp", "cs", "swift", "php", "scala", "lua", "ex", "exs",
];
