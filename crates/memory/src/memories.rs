//! Named, human-readable memory documents under `<root>/.symkg/memories/`,
//! written on demand for downstream agents. This layer reads the store and
//! never mutates it.

use crate::error::{MemoryError, Result};
use crate::lock::acquire_memory_lock;
use crate::snapshot::snapshot;
use std::path::{Path, PathBuf};
use symkg_protocol::{ContextTag, Predicate};
use symkg_store::{project_data_dir, FactGraph, FactPattern, FactStore};

const MEMORIES_DIR_NAME: &str = "memories";
const OVERVIEW_MEMORY: &str = "project_overview";
const GRAPH_MEMORY: &str = "knowledge_graph";
const COMMANDS_MEMORY: &str = "command_reference";

/// Durable document store for derived knowledge.
pub struct MemoryStore {
    root: PathBuf,
    dir: PathBuf,
}

impl MemoryStore {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let dir = project_data_dir(&root).join(MEMORIES_DIR_NAME);
        Self { root, dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one named memory atomically (tmp + rename), serialized against
    /// other writers via the advisory memory lock.
    pub async fn write_memory(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let file_name = memory_file_name(name)?;
        let _lock = acquire_memory_lock(&self.root).await?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(file_name);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("wrote memory {}", path.display());
        Ok(path)
    }

    pub async fn read_memory(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(memory_file_name(name)?);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Memory names (without extension), sorted.
    pub async fn list_memories(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md")
                || path.extension().and_then(|e| e.to_str()) == Some("kg")
            {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn delete_memory(&self, name: &str) -> Result<bool> {
        let path = self.dir.join(memory_file_name(name)?);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Write the standard document set: project overview, full graph dump,
    /// and the agent-facing command reference.
    pub async fn write_default_memories(
        &self,
        project: &str,
        store: &FactStore,
    ) -> Result<Vec<PathBuf>> {
        let overview = project_overview(project, store);
        let graph_dump = snapshot(store, None);
        let commands = command_reference();

        let mut written = Vec::new();
        written.push(self.write_memory(OVERVIEW_MEMORY, &overview).await?);
        written.push(self.write_memory(GRAPH_MEMORY, &graph_dump).await?);
        written.push(self.write_memory(COMMANDS_MEMORY, &commands).await?);
        Ok(written)
    }
}

/// `.md` for prose memories, `.kg` for the graph dump.
fn memory_file_name(name: &str) -> Result<String> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(MemoryError::InvalidName(name.to_string()));
    }
    if name == GRAPH_MEMORY {
        Ok(format!("{name}.kg"))
    } else {
        Ok(format!("{name}.md"))
    }
}

/// Markdown summary of what the knowledge graph currently holds.
#[must_use]
pub fn project_overview(project: &str, store: &FactStore) -> String {
    let counts = store.counts_by_context();
    let graph = FactGraph::from_store(store);

    let mut out = format!("# {project} Knowledge Graph Overview\n\n");
    out.push_str(&format!(
        "Facts: {} across {} endpoints and {} relations.\n\n",
        store.len(),
        graph.node_count(),
        graph.edge_count()
    ));

    out.push_str("## Facts per sub-graph\n\n");
    for context in ContextTag::ALL {
        let count = counts.get(&context).copied().unwrap_or(0);
        if count > 0 {
            out.push_str(&format!("- `{context}`: {count}\n"));
        }
    }

    let top = graph.top_connected(10);
    if !top.is_empty() {
        out.push_str("\n## Most connected endpoints\n\n");
        for (endpoint, degree) in top {
            out.push_str(&format!("- `{endpoint}` ({degree} edges)\n"));
        }
    }

    let deps: Vec<String> = store
        .query(FactPattern::any().predicate(Predicate::DependsOn))
        .filter_map(|r| r.fact.object.as_literal().map(str::to_string))
        .collect();
    if !deps.is_empty() {
        out.push_str("\n## External dependencies\n\n");
        for dep in deps {
            out.push_str(&format!("- {dep}\n"));
        }
    }

    out
}

/// The agent-facing query surface, as a memory document.
#[must_use]
pub fn command_reference() -> String {
    let mut out = String::from("# Knowledge Graph Command Reference\n\n");
    out.push_str("## Pattern queries\n\n");
    out.push_str(
        "`FactStore::query(pattern)` matches facts with wildcards on any of \
         subject, predicate, object, context. Results stream in predicate-bucket \
         order; re-querying restarts from scratch.\n\n",
    );
    out.push_str("## Bulk export\n\n");
    out.push_str(
        "`FactStore::export(context)` returns every fact in one sub-graph; \
         `snapshot`/`load` turn the fact set into a durable, diff-friendly \
         document and back.\n\n",
    );
    out.push_str("## Predicates\n\n");
    for predicate in Predicate::ALL {
        out.push_str(&format!("- `{predicate}`\n"));
    }
    out.push_str("\n## Contexts\n\n");
    for context in ContextTag::ALL {
        out.push_str(&format!("- `{context}`\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use symkg_protocol::SymbolKind;
    use symkg_store::{Fact, FactEndpoint, FactRecord, Provenance};
    use tempfile::tempdir;

    fn seeded_store() -> FactStore {
        let store = FactStore::new();
        store
            .upsert(vec![
                FactRecord::new(
                    Fact::triple(
                        FactEndpoint::symbol("check", SymbolKind::Function),
                        Predicate::DefinedIn,
                        FactEndpoint::literal("a.py"),
                    ),
                    Provenance::new("a.py", 1),
                ),
                FactRecord::new(
                    Fact::new(
                        FactEndpoint::literal("kawaiigpt"),
                        Predicate::DependsOn,
                        FactEndpoint::literal("edge_tts"),
                        ContextTag::Dependencies,
                    ),
                    Provenance::new("requirements.txt", 1),
                ),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn write_read_list_delete_roundtrip() {
        let temp = tempdir().unwrap();
        let memories = MemoryStore::new(temp.path());

        memories
            .write_memory("project_onboarding", "# Onboarding\n")
            .await
            .unwrap();
        assert_eq!(
            memories.read_memory("project_onboarding").await.unwrap(),
            Some("# Onboarding\n".to_string())
        );
        assert_eq!(
            memories.list_memories().await.unwrap(),
            vec!["project_onboarding"]
        );

        assert!(memories.delete_memory("project_onboarding").await.unwrap());
        assert!(!memories.delete_memory("project_onboarding").await.unwrap());
        assert_eq!(memories.read_memory("project_onboarding").await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_without_directory_is_empty() {
        let temp = tempdir().unwrap();
        let memories = MemoryStore::new(temp.path());
        assert_eq!(memories.list_memories().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn invalid_memory_names_are_rejected() {
        let temp = tempdir().unwrap();
        let memories = MemoryStore::new(temp.path());
        let err = memories.write_memory("../escape", "nope").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidName(_)));
    }

    #[tokio::test]
    async fn default_memories_cover_overview_graph_and_commands() {
        let temp = tempdir().unwrap();
        let store = seeded_store();
        let memories = MemoryStore::new(temp.path());

        let written = memories
            .write_default_memories("kawaiigpt", &store)
            .await
            .unwrap();
        assert_eq!(written.len(), 3);

        let names = memories.list_memories().await.unwrap();
        assert_eq!(
            names,
            vec!["command_reference", "knowledge_graph", "project_overview"]
        );

        let overview = memories
            .read_memory("project_overview")
            .await
            .unwrap()
            .unwrap();
        assert!(overview.contains("kawaiigpt"));
        assert!(overview.contains("edge_tts"));
        assert!(overview.contains("`code_structure`: 1"));

        // The graph dump is itself a loadable snapshot.
        let dump = memories.read_memory("knowledge_graph").await.unwrap().unwrap();
        let restored = crate::snapshot::load(&dump).unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn command_reference_names_every_predicate() {
        let reference = command_reference();
        for predicate in Predicate::ALL {
            assert!(reference.contains(predicate.as_str()));
        }
    }
}
