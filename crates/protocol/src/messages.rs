use crate::vocabulary::SymbolKind;
use serde::{Deserialize, Serialize};

/// Kind of introspection request brokered to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Enumerate the top-level entities of a file.
    DocumentSymbols,
    Definition,
    References,
    CallHierarchy,
    TypeHierarchy,
}

/// Zero-based position inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A resolved source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Location {
    /// Compact `file:line` rendering used for location literals.
    #[must_use]
    pub fn display_compact(&self) -> String {
        format!("{}:{}", self.file, self.start_line)
    }
}

/// A symbol as reported by the backend.
///
/// `children` carries lexical containment (a class's methods, a module's
/// functions) for document-symbol responses; leaf queries leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    pub kind: SymbolKind,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolInfo>,
}

impl SymbolInfo {
    /// Qualified name when the backend provides one, plain name otherwise.
    #[must_use]
    pub fn qualified(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or(&self.name)
    }
}

/// An outgoing call edge from a call-hierarchy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub target: SymbolInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_sites: Vec<Location>,
}

/// A supertype edge from a type-hierarchy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEdge {
    pub supertype: SymbolInfo,
}

/// Request sent to the backend, keyed by (method, file, position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub id: u64,
    pub method: QueryKind,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Payload of a successful backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum QueryResult {
    Symbols(Vec<SymbolInfo>),
    Locations(Vec<Location>),
    CallEdges(Vec<CallEdge>),
    TypeEdges(Vec<TypeEdge>),
}

impl QueryResult {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Symbols(items) => items.len(),
            QueryResult::Locations(items) => items.len(),
            QueryResult::CallEdges(items) => items.len(),
            QueryResult::TypeEdges(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response read back from the backend; matched to a request by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendResponse {
    #[must_use]
    pub fn ok(id: u64, result: QueryResult) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_symbol() -> SymbolInfo {
        SymbolInfo {
            name: "check".to_string(),
            qualified_name: Some("a.check".to_string()),
            kind: SymbolKind::Function,
            location: Location {
                file: "a.py".to_string(),
                start_line: 3,
                end_line: 9,
            },
            children: Vec::new(),
        }
    }

    #[test]
    fn request_serializes_without_null_position() {
        let request = BackendRequest {
            id: 7,
            method: QueryKind::DocumentSymbols,
            file: "a.py".to_string(),
            position: None,
        };
        let raw = serde_json::to_string(&request).unwrap();
        assert!(!raw.contains("position"));
        assert!(raw.contains("\"document_symbols\""));
    }

    #[test]
    fn response_round_trips() {
        let response = BackendResponse::ok(7, QueryResult::Symbols(vec![sample_symbol()]));
        let raw = serde_json::to_string(&response).unwrap();
        let parsed: BackendResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn qualified_falls_back_to_name() {
        let mut symbol = sample_symbol();
        assert_eq!(symbol.qualified(), "a.check");
        symbol.qualified_name = None;
        assert_eq!(symbol.qualified(), "check");
    }

    #[test]
    fn error_response_carries_message() {
        let response = BackendResponse::err(3, "unsupported file");
        assert!(response.result.is_none());
        assert_eq!(response.error.as_deref(), Some("unsupported file"));
    }
}
