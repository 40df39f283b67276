use crate::error::{Result, StoreError};
use crate::types::{Fact, FactPattern, FactRecord};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use symkg_protocol::{ContextTag, Predicate};

/// Deduplicating, revision-aware fact store.
///
/// Facts are held in per-predicate buckets, each behind its own lock, so
/// writers to one predicate never block queries over another. Within a
/// bucket, facts keep insertion order; merging is by structural equality of
/// (subject, predicate, object, context).
pub struct FactStore {
    buckets: Vec<(Predicate, RwLock<Bucket>)>,
}

#[derive(Default)]
struct Bucket {
    rows: Vec<FactRecord>,
    index: HashMap<Fact, usize>,
}

/// Outcome counters for one `upsert` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Facts not previously present.
    pub inserted: usize,
    /// Existing facts whose provenance stamp advanced to a newer revision.
    pub refreshed: usize,
    /// Facts already present at the same or a newer revision.
    pub unchanged: usize,
}

impl FactStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: Predicate::ALL
                .iter()
                .map(|p| (*p, RwLock::new(Bucket::default())))
                .collect(),
        }
    }

    fn bucket(&self, predicate: Predicate) -> &RwLock<Bucket> {
        // Buckets are created for every predicate in `new`.
        &self
            .buckets
            .iter()
            .find(|(p, _)| *p == predicate)
            .expect("bucket exists for every predicate")
            .1
    }

    fn read_bucket(lock: &RwLock<Bucket>) -> RwLockReadGuard<'_, Bucket> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_bucket(lock: &RwLock<Bucket>) -> RwLockWriteGuard<'_, Bucket> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge facts into the store.
    ///
    /// A record whose fact is already present does not create a duplicate:
    /// if its revision is newer, only the provenance stamp is updated
    /// (newest wins, including a symbol reclassified across passes); an
    /// older revision is ignored.
    pub fn upsert(&self, records: impl IntoIterator<Item = FactRecord>) -> Result<UpsertSummary> {
        // Group per predicate first so each bucket is locked once per call,
        // preserving input order within the bucket.
        let mut grouped: HashMap<Predicate, Vec<FactRecord>> = HashMap::new();
        for record in records {
            grouped
                .entry(record.fact.predicate)
                .or_default()
                .push(record);
        }

        let mut summary = UpsertSummary::default();
        for (predicate, batch) in grouped {
            let mut bucket = Self::write_bucket(self.bucket(predicate));
            for record in batch {
                match bucket.index.get(&record.fact).copied() {
                    Some(pos) => {
                        let existing = bucket.rows.get_mut(pos).ok_or_else(|| {
                            conflict(&record.fact, "index points past bucket end")
                        })?;
                        if existing.fact != record.fact {
                            return Err(conflict(&record.fact, "index points at a different fact"));
                        }
                        if record.provenance.revision > existing.provenance.revision {
                            existing.provenance = record.provenance;
                            summary.refreshed += 1;
                        } else {
                            summary.unchanged += 1;
                        }
                    }
                    None => {
                        let pos = bucket.rows.len();
                        bucket.index.insert(record.fact.clone(), pos);
                        bucket.rows.push(record);
                        summary.inserted += 1;
                    }
                }
            }
        }

        log::debug!(
            "upsert: {} inserted, {} refreshed, {} unchanged",
            summary.inserted,
            summary.refreshed,
            summary.unchanged
        );
        Ok(summary)
    }

    /// Lazily yield facts matching `pattern`.
    ///
    /// Each call returns a fresh, finite iterator. Results come in
    /// predicate-bucket order, insertion order within a bucket; each bucket
    /// is snapshotted when the iterator reaches it (no global snapshot).
    #[must_use]
    pub fn query(&self, pattern: FactPattern) -> FactQuery<'_> {
        let predicates: Vec<Predicate> = match pattern.predicate {
            Some(predicate) => vec![predicate],
            None => Predicate::ALL.to_vec(),
        };
        FactQuery {
            store: self,
            pattern,
            predicates: predicates.into_iter(),
            current: Vec::new().into_iter(),
        }
    }

    /// All facts in one context sub-graph (bulk export for snapshots).
    #[must_use]
    pub fn export(&self, context: ContextTag) -> Vec<FactRecord> {
        self.query(FactPattern::any().context(context)).collect()
    }

    /// Drop every fact derived from `file` at a revision older than
    /// `revision`. Returns the number of facts removed.
    pub fn prune(&self, file: &str, revision: u64) -> usize {
        let mut removed = 0;
        for (_, lock) in &self.buckets {
            let mut bucket = Self::write_bucket(lock);
            let before = bucket.rows.len();
            bucket
                .rows
                .retain(|r| !(r.provenance.file == file && r.provenance.revision < revision));
            if bucket.rows.len() != before {
                removed += before - bucket.rows.len();
                bucket.index = bucket
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(pos, r)| (r.fact.clone(), pos))
                    .collect();
            }
        }
        if removed > 0 {
            log::debug!("prune: removed {removed} facts from {file} below revision {revision}");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|(_, lock)| Self::read_bucket(lock).rows.len())
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fact counts per context sub-graph.
    #[must_use]
    pub fn counts_by_context(&self) -> HashMap<ContextTag, usize> {
        let mut counts = HashMap::new();
        for (_, lock) in &self.buckets {
            for row in &Self::read_bucket(lock).rows {
                *counts.entry(row.fact.context).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(fact: &Fact, detail: &str) -> StoreError {
    let message = format!("{fact}: {detail}");
    log::error!("fact store consistency fault: {message}");
    StoreError::Conflict(message)
}

/// Lazy pattern-query iterator over the store.
pub struct FactQuery<'a> {
    store: &'a FactStore,
    pattern: FactPattern,
    predicates: std::vec::IntoIter<Predicate>,
    current: std::vec::IntoIter<FactRecord>,
}

impl Iterator for FactQuery<'_> {
    type Item = FactRecord;

    fn next(&mut self) -> Option<FactRecord> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(record);
            }
            let predicate = self.predicates.next()?;
            let bucket = FactStore::read_bucket(self.store.bucket(predicate));
            let matching: Vec<FactRecord> = bucket
                .rows
                .iter()
                .filter(|r| self.pattern.matches(&r.fact))
                .cloned()
                .collect();
            self.current = matching.into_iter();
        }
    }
}
