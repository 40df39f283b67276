//! Line-oriented snapshot format for the fact set.
//!
//! One record per line, tab-separated:
//!
//! ```text
//! # symkg-snapshot v1 vocab=1
//! code_structure	sym:function:check	definedIn	lit:a.py	a.py@1
//! dependencies	lit:kawaiigpt	dependsOn	lit:edge_tts	requirements.txt@1
//! ```
//!
//! Buckets emit in predicate-vocabulary order, facts in insertion order
//! within a bucket, so the document is byte-stable under re-serialization
//! and diffs cleanly. `load(snapshot(S)) == S` as a set of records.

use crate::error::{MemoryError, Result};
use symkg_protocol::{ContextTag, Predicate, SymbolKind, VOCABULARY_VERSION};
use symkg_store::{Fact, FactEndpoint, FactPattern, FactRecord, FactStore, Provenance, SymbolRef};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const SYMBOL_PREFIX: &str = "sym:";
const LITERAL_PREFIX: &str = "lit:";

/// Serialize the store's fact set (optionally one context sub-graph) into
/// the snapshot document format.
#[must_use]
pub fn snapshot(store: &FactStore, context: Option<ContextTag>) -> String {
    let mut out = format!(
        "# symkg-snapshot v{SNAPSHOT_FORMAT_VERSION} vocab={VOCABULARY_VERSION}\n"
    );

    for predicate in Predicate::ALL {
        let mut pattern = FactPattern::any().predicate(predicate);
        if let Some(context) = context {
            pattern = pattern.context(context);
        }
        for record in store.query(pattern) {
            out.push_str(&render_record(&record));
            out.push('\n');
        }
    }
    out
}

/// Parse a snapshot document back into fact records.
pub fn load(document: &str) -> Result<Vec<FactRecord>> {
    let mut records = Vec::new();
    let mut saw_header = false;

    for (idx, line) in document.lines().enumerate() {
        let number = idx + 1;
        let trimmed = line.trim_end_matches('\r');
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            if !saw_header {
                check_header(number, rest)?;
                saw_header = true;
            }
            continue;
        }
        if !saw_header {
            return Err(MemoryError::parse(number, "missing snapshot header"));
        }
        records.push(parse_record(number, trimmed)?);
    }

    Ok(records)
}

fn check_header(line: usize, rest: &str) -> Result<()> {
    let rest = rest.trim();
    if !rest.starts_with("symkg-snapshot") {
        return Err(MemoryError::parse(line, "not a symkg snapshot"));
    }
    for token in rest.split_whitespace() {
        if let Some(vocab) = token.strip_prefix("vocab=") {
            let vocab: u32 = vocab
                .parse()
                .map_err(|_| MemoryError::parse(line, "malformed vocab version"))?;
            if vocab > VOCABULARY_VERSION {
                return Err(MemoryError::parse(
                    line,
                    format!(
                        "snapshot vocabulary v{vocab} is newer than supported v{VOCABULARY_VERSION}"
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn render_record(record: &FactRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}@{}",
        record.fact.context.as_str(),
        render_endpoint(&record.fact.subject),
        record.fact.predicate.as_str(),
        render_endpoint(&record.fact.object),
        escape(&record.provenance.file),
        record.provenance.revision,
    )
}

fn parse_record(line: usize, raw: &str) -> Result<FactRecord> {
    let fields: Vec<&str> = raw.split('\t').collect();
    if fields.len() != 5 {
        return Err(MemoryError::parse(
            line,
            format!("expected 5 tab-separated fields, found {}", fields.len()),
        ));
    }

    let context = ContextTag::parse(fields[0])
        .ok_or_else(|| MemoryError::parse(line, format!("unknown context `{}`", fields[0])))?;
    let subject = parse_endpoint(line, fields[1])?;
    let predicate = Predicate::parse(fields[2])
        .ok_or_else(|| MemoryError::parse(line, format!("unknown predicate `{}`", fields[2])))?;
    let object = parse_endpoint(line, fields[3])?;

    let (file, revision) = fields[4]
        .rsplit_once('@')
        .ok_or_else(|| MemoryError::parse(line, "malformed provenance, expected file@revision"))?;
    let revision: u64 = revision
        .parse()
        .map_err(|_| MemoryError::parse(line, format!("malformed revision `{revision}`")))?;

    Ok(FactRecord::new(
        Fact::new(subject, predicate, object, context),
        Provenance::new(unescape(line, file)?, revision),
    ))
}

fn render_endpoint(endpoint: &FactEndpoint) -> String {
    match endpoint {
        FactEndpoint::Symbol(sym) => format!(
            "{SYMBOL_PREFIX}{}:{}",
            sym.kind.as_str(),
            escape(&sym.qualified_name)
        ),
        FactEndpoint::Literal(value) => format!("{LITERAL_PREFIX}{}", escape(value)),
    }
}

fn parse_endpoint(line: usize, raw: &str) -> Result<FactEndpoint> {
    if let Some(rest) = raw.strip_prefix(SYMBOL_PREFIX) {
        let (kind, name) = rest
            .split_once(':')
            .ok_or_else(|| MemoryError::parse(line, "symbol endpoint missing kind"))?;
        let kind = SymbolKind::parse(kind)
            .ok_or_else(|| MemoryError::parse(line, format!("unknown symbol kind `{kind}`")))?;
        return Ok(FactEndpoint::Symbol(SymbolRef::new(
            unescape(line, name)?,
            kind,
        )));
    }
    if let Some(rest) = raw.strip_prefix(LITERAL_PREFIX) {
        return Ok(FactEndpoint::Literal(unescape(line, rest)?));
    }
    Err(MemoryError::parse(
        line,
        format!("endpoint must start with `sym:` or `lit:`, found `{raw}`"),
    ))
}

/// Keep records one-per-line and fields tab-separated regardless of what
/// literals contain.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(line: usize, raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => {
                return Err(MemoryError::parse(
                    line,
                    format!("invalid escape `\\{}`", other.map(String::from).unwrap_or_default()),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

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
                    Provenance::new("requirements.txt", 2),
                ),
                FactRecord::new(
                    Fact::new(
                        FactEndpoint::symbol("main", SymbolKind::Function),
                        Predicate::Calls,
                        FactEndpoint::symbol("check", SymbolKind::Function),
                        ContextTag::CallGraph,
                    ),
                    Provenance::new("main.py", 1),
                ),
            ])
            .unwrap();
        store
    }

    #[test]
    fn snapshot_round_trips_as_a_set() {
        let store = seeded_store();
        let document = snapshot(&store, None);
        let loaded = load(&document).unwrap();

        let original: HashSet<FactRecord> =
            store.query(FactPattern::any()).collect();
        let restored: HashSet<FactRecord> = loaded.into_iter().collect();
        assert_eq!(restored, original);
    }

    #[test]
    fn snapshot_is_stable_under_reserialization() {
        let store = seeded_store();
        let first = snapshot(&store, None);

        let restored = FactStore::new();
        restored.upsert(load(&first).unwrap()).unwrap();
        let second = snapshot(&restored, None);
        assert_eq!(first, second);
    }

    #[test]
    fn snapshot_can_filter_one_context() {
        let store = seeded_store();
        let document = snapshot(&store, Some(ContextTag::Dependencies));
        let loaded = load(&document).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fact.predicate, Predicate::DependsOn);
    }

    #[test]
    fn literals_with_tabs_and_newlines_survive() {
        let store = FactStore::new();
        store
            .upsert(vec![FactRecord::new(
                Fact::new(
                    FactEndpoint::literal("doc\ttitle"),
                    Predicate::HasFeature,
                    FactEndpoint::literal("line one\nline two\\end"),
                    ContextTag::Features,
                ),
                Provenance::new("weird @ path.md", 7),
            )])
            .unwrap();

        let document = snapshot(&store, None);
        let loaded = load(&document).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded[0].fact.subject.as_literal(),
            Some("doc\ttitle")
        );
        assert_eq!(
            loaded[0].fact.object.as_literal(),
            Some("line one\nline two\\end")
        );
        assert_eq!(loaded[0].provenance.file, "weird @ path.md");
        assert_eq!(loaded[0].provenance.revision, 7);
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = load("code_structure\tlit:a\tdefinedIn\tlit:b\tf@1\n").unwrap_err();
        assert!(matches!(err, MemoryError::Parse { line: 1, .. }));
    }

    #[test]
    fn newer_vocabulary_is_rejected() {
        let document = "# symkg-snapshot v1 vocab=999\n";
        let err = load(document).unwrap_err();
        assert!(err.to_string().contains("vocabulary"));
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let document = "# symkg-snapshot v1 vocab=1\ncode_structure\tonly three fields\n";
        let err = load(document).unwrap_err();
        assert!(matches!(err, MemoryError::Parse { line: 2, .. }));
    }

    #[test]
    fn unknown_predicate_is_rejected() {
        let document = "# symkg-snapshot v1 vocab=1\ncode_structure\tlit:a\tknows\tlit:b\tf@1\n";
        let err = load(document).unwrap_err();
        assert!(err.to_string().contains("unknown predicate"));
    }

    #[test]
    fn empty_store_round_trips() {
        let store = FactStore::new();
        let document = snapshot(&store, None);
        assert_eq!(load(&document).unwrap(), Vec::new());
    }
}
