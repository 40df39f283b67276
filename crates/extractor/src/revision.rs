use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Per-file monotonic revision counter keyed on content hashes.
///
/// A revision advances only when the file's content actually changed, so
/// editor touch events and mtime churn never trigger re-extraction.
#[derive(Default)]
pub struct RevisionTracker {
    files: Mutex<HashMap<String, FileRevision>>,
}

struct FileRevision {
    revision: u64,
    // `None` after `invalidate`: the next observation bumps the revision
    // even for identical content, forcing a clean re-extraction.
    digest: Option<[u8; 32]>,
}

impl RevisionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<String, FileRevision>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a file observation. Returns the new revision when the content
    /// changed (or the file is first seen), `None` when unchanged.
    pub fn observe(&self, file: &str, content: &[u8]) -> Option<u64> {
        let digest: [u8; 32] = Sha256::digest(content).into();
        let mut files = self.files();
        match files.get_mut(file) {
            Some(state) => {
                if state.digest == Some(digest) {
                    return None;
                }
                state.revision += 1;
                state.digest = Some(digest);
                Some(state.revision)
            }
            None => {
                files.insert(
                    file.to_string(),
                    FileRevision {
                        revision: 1,
                        digest: Some(digest),
                    },
                );
                Some(1)
            }
        }
    }

    #[must_use]
    pub fn current(&self, file: &str) -> Option<u64> {
        self.files().get(file).map(|state| state.revision)
    }

    /// Forget the stored digest but keep the counter, so the next
    /// observation re-extracts at a fresh revision. Used after a failed
    /// extraction: the bumped revision was consumed, but no facts landed.
    pub fn invalidate(&self, file: &str) {
        if let Some(state) = self.files().get_mut(file) {
            state.digest = None;
        }
    }

    /// Stop tracking a deleted file.
    pub fn forget(&self, file: &str) {
        self.files().remove(file);
    }

    #[must_use]
    pub fn tracked_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.files().keys().cloned().collect();
        files.sort();
        files
    }
}
