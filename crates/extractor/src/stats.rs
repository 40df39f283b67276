use serde::{Deserialize, Serialize};

/// Statistics for one full analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Files whose content changed and were (re-)extracted.
    pub files: usize,

    /// Facts inserted or refreshed in the store.
    pub facts: usize,

    /// Symbols produced across extracted files.
    pub symbols: usize,

    /// Per-entity queries skipped as partial extractions.
    pub skipped_queries: usize,

    /// Time taken in milliseconds.
    pub time_ms: u64,

    /// Files that failed outright.
    pub errors: Vec<String>,
}

impl ExtractionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, facts: usize, symbols: usize, skipped_queries: usize) {
        self.files += 1;
        self.facts += facts;
        self.symbols += symbols;
        self.skipped_queries += skipped_queries;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}
