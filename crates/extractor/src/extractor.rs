use crate::error::{ExtractorError, Result};
use crate::manifest::extract_manifest_facts;
use crate::scanner::FileScanner;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use symkg_protocol::{
    ContextTag, Position, Predicate, QueryKind, QueryResult, SymbolInfo,
};
use symkg_session::{SessionError, SessionHandle, SessionManager};
use symkg_store::{Fact, FactEndpoint, FactRecord, Provenance, Symbol, SymbolRef};

/// A per-entity backend failure that did not abort the file's extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialExtraction {
    pub file: String,
    pub entity: String,
    pub method: QueryKind,
    pub reason: String,
}

impl fmt::Display for PartialExtraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:?} for `{}` failed: {}",
            self.file, self.method, self.entity, self.reason
        )
    }
}

/// Everything one extraction pass produced for one file.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub file: String,
    pub revision: u64,
    pub facts: Vec<FactRecord>,
    pub symbols: Vec<Symbol>,
    pub diagnostics: Vec<PartialExtraction>,
}

/// Stateless fact extractor: walks a file's entities through the session
/// manager and applies fixed pattern rules mapping response shapes to
/// predicates. Deterministic given the same content and responses.
pub struct Extractor {
    manager: Arc<SessionManager>,
    project: String,
}

impl Extractor {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>, project: impl Into<String>) -> Self {
        Self {
            manager,
            project: project.into(),
        }
    }

    /// Extract facts from one file at the given revision.
    ///
    /// Per-entity query failures become [`PartialExtraction`] diagnostics;
    /// only a failed entity enumeration aborts the file.
    pub async fn extract(
        &self,
        handle: &SessionHandle,
        file: &str,
        content: &str,
        revision: u64,
    ) -> Result<ExtractionOutcome> {
        if FileScanner::is_manifest_file(Path::new(file)) {
            return Ok(ExtractionOutcome {
                file: file.to_string(),
                revision,
                facts: extract_manifest_facts(&self.project, file, content, revision),
                symbols: Vec::new(),
                diagnostics: Vec::new(),
            });
        }

        let response = self
            .manager
            .query(handle, file, None, QueryKind::DocumentSymbols)
            .await?;
        let QueryResult::Symbols(infos) = response else {
            return Err(ExtractorError::UnexpectedResponse(format!(
                "document symbols for {file}"
            )));
        };

        let mut sink = FactSink::new(file, revision);
        let mut symbols = Vec::new();
        let mut diagnostics = Vec::new();

        for entity in flatten_entities(&infos) {
            self.extract_entity(handle, file, &entity, &mut sink, &mut symbols, &mut diagnostics)
                .await;
        }

        log::debug!(
            "extracted {} facts ({} symbols, {} skipped queries) from {file}@{revision}",
            sink.records.len(),
            symbols.len(),
            diagnostics.len()
        );

        Ok(ExtractionOutcome {
            file: file.to_string(),
            revision,
            facts: sink.records,
            symbols,
            diagnostics,
        })
    }

    async fn extract_entity(
        &self,
        handle: &SessionHandle,
        file: &str,
        entity: &Entity<'_>,
        sink: &mut FactSink,
        symbols: &mut Vec<Symbol>,
        diagnostics: &mut Vec<PartialExtraction>,
    ) {
        let info = entity.info;
        let subject = SymbolRef::new(info.qualified(), info.kind);
        symbols.push(Symbol::from_info(info));

        // Structural rules that need no further queries.
        sink.push(Fact::new(
            FactEndpoint::Symbol(subject.clone()),
            Predicate::IsA,
            FactEndpoint::literal(info.kind.as_str()),
            ContextTag::CodeStructure,
        ));
        sink.push(Fact::new(
            FactEndpoint::Symbol(subject.clone()),
            Predicate::DefinedIn,
            FactEndpoint::literal(file),
            ContextTag::CodeStructure,
        ));
        sink.push(Fact::new(
            FactEndpoint::Symbol(subject.clone()),
            Predicate::LocatedAt,
            FactEndpoint::literal(info.location.display_compact()),
            ContextTag::CodeStructure,
        ));
        match &entity.parent {
            Some(parent) => sink.push(Fact::new(
                FactEndpoint::Symbol(parent.clone()),
                Predicate::Contains,
                FactEndpoint::Symbol(subject.clone()),
                ContextTag::CodeStructure,
            )),
            None => sink.push(Fact::new(
                FactEndpoint::literal(file),
                Predicate::Provides,
                FactEndpoint::Symbol(subject.clone()),
                ContextTag::CodeStructure,
            )),
        }

        // An import entity is a dependency edge, not a queryable symbol.
        if info.kind == symkg_protocol::SymbolKind::Import {
            sink.push(Fact::new(
                FactEndpoint::literal(file),
                Predicate::DependsOn,
                FactEndpoint::literal(info.name.clone()),
                ContextTag::Dependencies,
            ));
            return;
        }

        let position = Position {
            line: info.location.start_line,
            column: 0,
        };

        if info.kind.is_callable() {
            match self
                .manager
                .query(handle, file, Some(position), QueryKind::CallHierarchy)
                .await
            {
                Ok(QueryResult::CallEdges(edges)) => {
                    for edge in edges {
                        sink.push(Fact::new(
                            FactEndpoint::Symbol(subject.clone()),
                            Predicate::Calls,
                            FactEndpoint::symbol(edge.target.qualified(), edge.target.kind),
                            ContextTag::CallGraph,
                        ));
                    }
                }
                Ok(_) => diagnostics.push(skipped(
                    file,
                    &subject,
                    QueryKind::CallHierarchy,
                    "unexpected response shape",
                )),
                Err(err) => diagnostics.push(skipped(
                    file,
                    &subject,
                    QueryKind::CallHierarchy,
                    &err.to_string(),
                )),
            }
        }

        if info.kind.is_type_like() {
            match self
                .manager
                .query(handle, file, Some(position), QueryKind::TypeHierarchy)
                .await
            {
                Ok(QueryResult::TypeEdges(edges)) => {
                    for edge in edges {
                        sink.push(Fact::new(
                            FactEndpoint::Symbol(subject.clone()),
                            Predicate::InheritsFrom,
                            FactEndpoint::symbol(edge.supertype.qualified(), edge.supertype.kind),
                            ContextTag::Inheritance,
                        ));
                    }
                }
                Ok(_) => diagnostics.push(skipped(
                    file,
                    &subject,
                    QueryKind::TypeHierarchy,
                    "unexpected response shape",
                )),
                Err(err) => diagnostics.push(skipped(
                    file,
                    &subject,
                    QueryKind::TypeHierarchy,
                    &err.to_string(),
                )),
            }
        }

        match self
            .manager
            .query(handle, file, Some(position), QueryKind::References)
            .await
        {
            Ok(QueryResult::Locations(locations)) => {
                for location in locations {
                    sink.push(Fact::new(
                        FactEndpoint::Symbol(subject.clone()),
                        Predicate::References,
                        FactEndpoint::literal(location.display_compact()),
                        ContextTag::Usage,
                    ));
                }
            }
            Ok(_) => diagnostics.push(skipped(
                file,
                &subject,
                QueryKind::References,
                "unexpected response shape",
            )),
            Err(err) => diagnostics.push(skipped(
                file,
                &subject,
                QueryKind::References,
                &err.to_string(),
            )),
        }
    }
}

fn skipped(file: &str, subject: &SymbolRef, method: QueryKind, reason: &str) -> PartialExtraction {
    PartialExtraction {
        file: file.to_string(),
        entity: subject.qualified_name.clone(),
        method,
        reason: reason.to_string(),
    }
}

struct Entity<'a> {
    info: &'a SymbolInfo,
    parent: Option<SymbolRef>,
}

/// Flatten the document-symbol tree depth-first, keeping parent links for
/// `contains` edges. Iterative so entity queries stay in a plain loop.
fn flatten_entities(infos: &[SymbolInfo]) -> Vec<Entity<'_>> {
    let mut out = Vec::new();
    let mut stack: Vec<Entity<'_>> = infos
        .iter()
        .rev()
        .map(|info| Entity { info, parent: None })
        .collect();

    while let Some(entity) = stack.pop() {
        let parent = SymbolRef::new(entity.info.qualified(), entity.info.kind);
        for child in entity.info.children.iter().rev() {
            stack.push(Entity {
                info: child,
                parent: Some(parent.clone()),
            });
        }
        out.push(entity);
    }
    out
}

/// Accumulates fact records, deduplicating within the pass while keeping
/// first-seen order, and stamping provenance uniformly.
struct FactSink {
    provenance: Provenance,
    seen: HashSet<Fact>,
    records: Vec<FactRecord>,
}

impl FactSink {
    fn new(file: &str, revision: u64) -> Self {
        Self {
            provenance: Provenance::new(file, revision),
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    fn push(&mut self, fact: Fact) {
        if self.seen.insert(fact.clone()) {
            self.records.push(FactRecord::new(fact, self.provenance.clone()));
        }
    }
}

// Classify session errors the watcher should not retry.
pub(crate) fn is_stale(err: &ExtractorError) -> bool {
    matches!(err, ExtractorError::Session(SessionError::Stale(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use symkg_protocol::{CallEdge, Location, SymbolKind};
    use symkg_session::script::{ScriptedBackend, ScriptedLauncher};
    use symkg_session::SessionOptions;
    use symkg_store::FactPattern;

    fn symbol(name: &str, kind: SymbolKind, line: u32) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            qualified_name: None,
            kind,
            location: Location {
                file: "a.py".to_string(),
                start_line: line,
                end_line: line + 3,
            },
            children: Vec::new(),
        }
    }

    async fn attach(
        backend: Arc<ScriptedBackend>,
        root: &Path,
    ) -> (Arc<SessionManager>, SessionHandle) {
        let launcher = Arc::new(ScriptedLauncher::new(backend));
        let manager = Arc::new(SessionManager::new(launcher, SessionOptions::default()));
        let handle = manager.attach(root).await.unwrap();
        (manager, handle)
    }

    #[tokio::test]
    async fn structural_facts_follow_the_pattern_rules() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());

        let mut class_info = symbol("Bot", SymbolKind::Class, 10);
        class_info.children.push(symbol("reply", SymbolKind::Method, 12));
        backend.respond(
            QueryKind::DocumentSymbols,
            "a.py",
            QueryResult::Symbols(vec![symbol("check", SymbolKind::Function, 1), class_info]),
        );
        backend.respond(
            QueryKind::CallHierarchy,
            "a.py",
            QueryResult::CallEdges(vec![CallEdge {
                target: symbol("fetch", SymbolKind::Function, 40),
                call_sites: Vec::new(),
            }]),
        );
        backend.respond(
            QueryKind::References,
            "a.py",
            QueryResult::Locations(vec![Location {
                file: "main.py".to_string(),
                start_line: 7,
                end_line: 7,
            }]),
        );
        backend.respond(QueryKind::TypeHierarchy, "a.py", QueryResult::TypeEdges(Vec::new()));

        let (manager, handle) = attach(backend, temp.path()).await;
        let extractor = Extractor::new(manager, "kawaiigpt");
        let outcome = extractor.extract(&handle, "a.py", "", 1).await.unwrap();

        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.symbols.len(), 3);

        let facts: Vec<&Fact> = outcome.facts.iter().map(|r| &r.fact).collect();
        let expect = |fact: Fact| assert!(facts.contains(&&fact), "missing {fact}");

        expect(Fact::new(
            FactEndpoint::symbol("check", SymbolKind::Function),
            Predicate::DefinedIn,
            FactEndpoint::literal("a.py"),
            ContextTag::CodeStructure,
        ));
        expect(Fact::new(
            FactEndpoint::symbol("check", SymbolKind::Function),
            Predicate::IsA,
            FactEndpoint::literal("function"),
            ContextTag::CodeStructure,
        ));
        expect(Fact::new(
            FactEndpoint::literal("a.py"),
            Predicate::Provides,
            FactEndpoint::symbol("Bot", SymbolKind::Class),
            ContextTag::CodeStructure,
        ));
        expect(Fact::new(
            FactEndpoint::symbol("Bot", SymbolKind::Class),
            Predicate::Contains,
            FactEndpoint::symbol("reply", SymbolKind::Method),
            ContextTag::CodeStructure,
        ));
        expect(Fact::new(
            FactEndpoint::symbol("check", SymbolKind::Function),
            Predicate::Calls,
            FactEndpoint::symbol("fetch", SymbolKind::Function),
            ContextTag::CallGraph,
        ));
        expect(Fact::new(
            FactEndpoint::symbol("check", SymbolKind::Function),
            Predicate::References,
            FactEndpoint::literal("main.py:7"),
            ContextTag::Usage,
        ));
    }

    #[tokio::test]
    async fn import_entities_become_dependency_edges() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            QueryKind::DocumentSymbols,
            "kawai.py",
            QueryResult::Symbols(vec![symbol("edge_tts", SymbolKind::Import, 1)]),
        );

        let (manager, handle) = attach(backend, temp.path()).await;
        let extractor = Extractor::new(manager, "kawaiigpt");
        let outcome = extractor.extract(&handle, "kawai.py", "", 1).await.unwrap();

        let dependency = Fact::new(
            FactEndpoint::literal("kawai.py"),
            Predicate::DependsOn,
            FactEndpoint::literal("edge_tts"),
            ContextTag::Dependencies,
        );
        assert!(outcome.facts.iter().any(|r| r.fact == dependency));
        // Imports are not queried further.
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn one_failing_entity_does_not_abort_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            QueryKind::DocumentSymbols,
            "a.py",
            QueryResult::Symbols(vec![
                symbol("broken", SymbolKind::Function, 1),
                symbol("healthy", SymbolKind::Function, 10),
            ]),
        );
        // Every call-hierarchy/reference probe fails, for both entities.
        backend.fail(QueryKind::CallHierarchy, "a.py", "backend crashed on entity");
        backend.fail(QueryKind::References, "a.py", "backend crashed on entity");

        let (manager, handle) = attach(backend, temp.path()).await;
        let extractor = Extractor::new(manager, "kawaiigpt");
        let outcome = extractor.extract(&handle, "a.py", "", 1).await.unwrap();

        // Structural facts for the healthy entity survive.
        assert!(outcome.facts.iter().any(|r| {
            r.fact.subject == FactEndpoint::symbol("healthy", SymbolKind::Function)
                && r.fact.predicate == Predicate::DefinedIn
        }));
        assert!(!outcome.facts.is_empty());
        assert_eq!(outcome.diagnostics.len(), 4);
        assert!(outcome.diagnostics.iter().all(|d| d.file == "a.py"));
    }

    #[tokio::test]
    async fn extraction_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            QueryKind::DocumentSymbols,
            "a.py",
            QueryResult::Symbols(vec![
                symbol("check", SymbolKind::Function, 1),
                symbol("render", SymbolKind::Function, 9),
            ]),
        );
        backend.respond(QueryKind::CallHierarchy, "a.py", QueryResult::CallEdges(Vec::new()));
        backend.respond(QueryKind::References, "a.py", QueryResult::Locations(Vec::new()));

        let (manager, handle) = attach(backend, temp.path()).await;
        let extractor = Extractor::new(manager, "kawaiigpt");

        let first = extractor.extract(&handle, "a.py", "", 1).await.unwrap();
        let second = extractor.extract(&handle, "a.py", "", 1).await.unwrap();
        assert_eq!(first.facts, second.facts);
        assert_eq!(first.symbols, second.symbols);
    }

    #[tokio::test]
    async fn manifest_files_bypass_the_backend() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (manager, handle) = attach(backend.clone(), temp.path()).await;

        let extractor = Extractor::new(manager, "kawaiigpt");
        let outcome = extractor
            .extract(&handle, "requirements.txt", "edge_tts\notherlib\n", 1)
            .await
            .unwrap();

        assert!(backend.calls().is_empty());
        let store = symkg_store::FactStore::new();
        store.upsert(outcome.facts).unwrap();
        let hits: Vec<_> = store
            .query(
                FactPattern::any()
                    .predicate(Predicate::DependsOn)
                    .object(FactEndpoint::literal("edge_tts")),
            )
            .collect();
        assert_eq!(hits.len(), 1);
    }
}
