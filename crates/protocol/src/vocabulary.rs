use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the predicate vocabulary. Bumped whenever a predicate is added
/// so persisted snapshots can detect a vocabulary mismatch on load.
pub const VOCABULARY_VERSION: u32 = 1;

/// Relation tag between two fact endpoints.
///
/// The vocabulary is closed: pattern matching over predicates stays
/// exhaustive, and adding a tag means extending this enum and bumping
/// [`VOCABULARY_VERSION`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// Subject is an instance of the object kind (e.g. `(check, isA, function)`).
    IsA,

    /// Subject is defined in the object file.
    DefinedIn,

    /// Subject's definition starts at the object `file:line` position.
    LocatedAt,

    /// Subject lexically contains the object (class contains method).
    Contains,

    /// Subject imports or otherwise depends on the object.
    DependsOn,

    /// Subject calls the object (call-hierarchy edge).
    Calls,

    /// Subject is referenced at the object site.
    References,

    /// Subject extends/implements the object (inheritance edge).
    InheritsFrom,

    /// Subject file/module provides the object symbol.
    Provides,

    /// Subject exhibits the object capability (inferred feature).
    HasFeature,
}

impl Predicate {
    /// All predicates in stable serialization order. Snapshot emission and
    /// bucket iteration follow this order.
    pub const ALL: [Predicate; 10] = [
        Predicate::IsA,
        Predicate::DefinedIn,
        Predicate::LocatedAt,
        Predicate::Contains,
        Predicate::DependsOn,
        Predicate::Calls,
        Predicate::References,
        Predicate::InheritsFrom,
        Predicate::Provides,
        Predicate::HasFeature,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Predicate::IsA => "isA",
            Predicate::DefinedIn => "definedIn",
            Predicate::LocatedAt => "locatedAt",
            Predicate::Contains => "contains",
            Predicate::DependsOn => "dependsOn",
            Predicate::Calls => "calls",
            Predicate::References => "references",
            Predicate::InheritsFrom => "inheritsFrom",
            Predicate::Provides => "provides",
            Predicate::HasFeature => "hasFeature",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Predicate::ALL.iter().copied().find(|p| p.as_str() == raw)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context tag partitioning facts into named sub-graphs.
///
/// A bare triple is a quad in the default graph ([`ContextTag::CodeStructure`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    #[default]
    CodeStructure,
    Dependencies,
    CallGraph,
    Inheritance,
    Usage,
    Metrics,
    Features,
}

impl ContextTag {
    pub const ALL: [ContextTag; 7] = [
        ContextTag::CodeStructure,
        ContextTag::Dependencies,
        ContextTag::CallGraph,
        ContextTag::Inheritance,
        ContextTag::Usage,
        ContextTag::Metrics,
        ContextTag::Features,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ContextTag::CodeStructure => "code_structure",
            ContextTag::Dependencies => "dependencies",
            ContextTag::CallGraph => "call_graph",
            ContextTag::Inheritance => "inheritance",
            ContextTag::Usage => "usage",
            ContextTag::Metrics => "metrics",
            ContextTag::Features => "features",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        ContextTag::ALL.iter().copied().find(|c| c.as_str() == raw)
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a code symbol as reported by the analysis backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Module,
    Variable,
    Constant,
    /// An import statement surfaced as a document entity.
    Import,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 10] = [
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Class,
        SymbolKind::Struct,
        SymbolKind::Enum,
        SymbolKind::Interface,
        SymbolKind::Module,
        SymbolKind::Variable,
        SymbolKind::Constant,
        SymbolKind::Import,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Module => "module",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Import => "import",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        SymbolKind::ALL.iter().copied().find(|k| k.as_str() == raw)
    }

    /// Kinds that participate in call-hierarchy queries.
    #[must_use]
    pub const fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Kinds that participate in type-hierarchy queries.
    #[must_use]
    pub const fn is_type_like(self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Interface
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn predicate_round_trips_through_str() {
        for predicate in Predicate::ALL {
            assert_eq!(Predicate::parse(predicate.as_str()), Some(predicate));
        }
        assert_eq!(Predicate::parse("knows"), None);
    }

    #[test]
    fn context_round_trips_through_str() {
        for context in ContextTag::ALL {
            assert_eq!(ContextTag::parse(context.as_str()), Some(context));
        }
        assert_eq!(ContextTag::parse("default"), None);
    }

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in SymbolKind::ALL {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn default_context_is_code_structure() {
        assert_eq!(ContextTag::default(), ContextTag::CodeStructure);
    }

    #[test]
    fn predicate_serde_uses_camel_case() {
        let json = serde_json::to_string(&Predicate::DependsOn).unwrap();
        assert_eq!(json, "\"dependsOn\"");
    }
}
