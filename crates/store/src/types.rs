use serde::{Deserialize, Serialize};
use std::fmt;
use symkg_protocol::{ContextTag, Location, Predicate, SymbolInfo, SymbolKind};

/// A code symbol with its defining location.
///
/// Immutable within a file revision; a changed file produces fresh symbols
/// rather than mutating old ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Symbol {
    #[must_use]
    pub fn from_info(info: &SymbolInfo) -> Self {
        Self {
            qualified_name: info.qualified().to_string(),
            kind: info.kind,
            file: info.location.file.clone(),
            start_line: info.location.start_line,
            end_line: info.location.end_line,
        }
    }

    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone(),
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }

    /// Identity of the logical symbol, independent of location.
    #[must_use]
    pub fn to_ref(&self) -> SymbolRef {
        SymbolRef {
            qualified_name: self.qualified_name.clone(),
            kind: self.kind,
        }
    }
}

/// Reference to a logical symbol: qualified name + kind.
///
/// Two extraction passes that see the same (name, kind) pair refer to the
/// same logical symbol, regardless of where its definition moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub qualified_name: String,
    pub kind: SymbolKind,
}

impl SymbolRef {
    #[must_use]
    pub fn new(qualified_name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.qualified_name)
    }
}

/// One endpoint of a fact: a symbol reference or a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactEndpoint {
    Symbol(SymbolRef),
    Literal(String),
}

impl FactEndpoint {
    #[must_use]
    pub fn symbol(qualified_name: impl Into<String>, kind: SymbolKind) -> Self {
        FactEndpoint::Symbol(SymbolRef::new(qualified_name, kind))
    }

    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        FactEndpoint::Literal(value.into())
    }

    #[must_use]
    pub fn as_symbol(&self) -> Option<&SymbolRef> {
        match self {
            FactEndpoint::Symbol(sym) => Some(sym),
            FactEndpoint::Literal(_) => None,
        }
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            FactEndpoint::Symbol(_) => None,
            FactEndpoint::Literal(value) => Some(value),
        }
    }
}

impl fmt::Display for FactEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactEndpoint::Symbol(sym) => write!(f, "{sym}"),
            FactEndpoint::Literal(value) => f.write_str(value),
        }
    }
}

/// A structural fact: subject, predicate, object, and the sub-graph it
/// belongs to. Structural equality over all four fields is the store's
/// merge key; provenance lives outside, on [`FactRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub subject: FactEndpoint,
    pub predicate: Predicate,
    pub object: FactEndpoint,
    #[serde(default)]
    pub context: ContextTag,
}

impl Fact {
    #[must_use]
    pub fn new(
        subject: FactEndpoint,
        predicate: Predicate,
        object: FactEndpoint,
        context: ContextTag,
    ) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    /// A triple in the default graph.
    #[must_use]
    pub fn triple(subject: FactEndpoint, predicate: Predicate, object: FactEndpoint) -> Self {
        Self::new(subject, predicate, object, ContextTag::default())
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}) @{}",
            self.subject, self.predicate, self.object, self.context
        )
    }
}

/// Which file revision a fact was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub file: String,
    pub revision: u64,
}

impl Provenance {
    #[must_use]
    pub fn new(file: impl Into<String>, revision: u64) -> Self {
        Self {
            file: file.into(),
            revision,
        }
    }
}

/// A fact plus its provenance, as held by the store and returned by
/// queries. Staleness is visible to callers through `provenance.revision`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactRecord {
    pub fact: Fact,
    pub provenance: Provenance,
}

impl FactRecord {
    #[must_use]
    pub fn new(fact: Fact, provenance: Provenance) -> Self {
        Self { fact, provenance }
    }
}

/// Query pattern with wildcards: `None` matches anything in that slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactPattern {
    pub subject: Option<FactEndpoint>,
    pub predicate: Option<Predicate>,
    pub object: Option<FactEndpoint>,
    pub context: Option<ContextTag>,
}

impl FactPattern {
    /// Matches every fact.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subject(mut self, subject: FactEndpoint) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    #[must_use]
    pub fn object(mut self, object: FactEndpoint) -> Self {
        self.object = Some(object);
        self
    }

    #[must_use]
    pub fn context(mut self, context: ContextTag) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn matches(&self, fact: &Fact) -> bool {
        if let Some(subject) = &self.subject {
            if subject != &fact.subject {
                return false;
            }
        }
        if let Some(predicate) = self.predicate {
            if predicate != fact.predicate {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if object != &fact.object {
                return false;
            }
        }
        if let Some(context) = self.context {
            if context != fact.context {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn depends_on(subject: &str, object: &str) -> Fact {
        Fact::new(
            FactEndpoint::literal(subject),
            Predicate::DependsOn,
            FactEndpoint::literal(object),
            ContextTag::Dependencies,
        )
    }

    #[test]
    fn pattern_wildcards_match_everything() {
        let fact = depends_on("kawaiigpt", "edge_tts");
        assert!(FactPattern::any().matches(&fact));
    }

    #[test]
    fn pattern_filters_on_each_slot() {
        let fact = depends_on("kawaiigpt", "edge_tts");

        assert!(FactPattern::any()
            .predicate(Predicate::DependsOn)
            .object(FactEndpoint::literal("edge_tts"))
            .matches(&fact));
        assert!(!FactPattern::any()
            .object(FactEndpoint::literal("otherlib"))
            .matches(&fact));
        assert!(!FactPattern::any()
            .context(ContextTag::CallGraph)
            .matches(&fact));
    }

    #[test]
    fn symbol_and_literal_endpoints_are_distinct() {
        let as_symbol = FactEndpoint::symbol("check", SymbolKind::Function);
        let as_literal = FactEndpoint::literal("check");
        assert_ne!(as_symbol, as_literal);
        assert_eq!(as_literal.as_literal(), Some("check"));
        assert!(as_literal.as_symbol().is_none());
    }

    #[test]
    fn triple_lands_in_default_graph() {
        let fact = Fact::triple(
            FactEndpoint::symbol("check", SymbolKind::Function),
            Predicate::DefinedIn,
            FactEndpoint::literal("a.py"),
        );
        assert_eq!(fact.context, ContextTag::CodeStructure);
    }

    #[test]
    fn structural_equality_ignores_provenance() {
        let fact = depends_on("kawaiigpt", "edge_tts");
        let first = FactRecord::new(fact.clone(), Provenance::new("requirements.txt", 1));
        let second = FactRecord::new(fact, Provenance::new("requirements.txt", 2));
        assert_eq!(first.fact, second.fact);
        assert_ne!(first, second);
    }
}
