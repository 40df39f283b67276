use crate::store::FactStore;
use crate::types::{FactEndpoint, FactPattern};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use symkg_protocol::Predicate;

/// Directed relation view over the current fact set.
///
/// Built on demand from the store; endpoints become nodes, predicates
/// become edge weights. Used for neighborhood traversal (callers, callees,
/// dependency fan-out) and for ranking symbols by connectivity.
pub struct FactGraph {
    graph: DiGraph<FactEndpoint, Predicate>,
    endpoint_index: HashMap<FactEndpoint, NodeIndex>,
}

impl FactGraph {
    #[must_use]
    pub fn from_store(store: &FactStore) -> Self {
        let mut graph = DiGraph::new();
        let mut endpoint_index: HashMap<FactEndpoint, NodeIndex> = HashMap::new();

        for record in store.query(FactPattern::any()) {
            let subject = Self::intern(&mut graph, &mut endpoint_index, record.fact.subject);
            let object = Self::intern(&mut graph, &mut endpoint_index, record.fact.object);
            graph.add_edge(subject, object, record.fact.predicate);
        }

        Self {
            graph,
            endpoint_index,
        }
    }

    fn intern(
        graph: &mut DiGraph<FactEndpoint, Predicate>,
        index: &mut HashMap<FactEndpoint, NodeIndex>,
        endpoint: FactEndpoint,
    ) -> NodeIndex {
        if let Some(idx) = index.get(&endpoint) {
            return *idx;
        }
        let idx = graph.add_node(endpoint.clone());
        index.insert(endpoint, idx);
        idx
    }

    #[must_use]
    pub fn find(&self, endpoint: &FactEndpoint) -> Option<NodeIndex> {
        self.endpoint_index.get(endpoint).copied()
    }

    /// Outgoing neighbors over one predicate.
    #[must_use]
    pub fn neighbors(&self, endpoint: &FactEndpoint, predicate: Predicate) -> Vec<&FactEndpoint> {
        let Some(idx) = self.find(endpoint) else {
            return Vec::new();
        };
        self.graph
            .edges(idx)
            .filter(|e| *e.weight() == predicate)
            .filter_map(|e| self.graph.node_weight(e.target()))
            .collect()
    }

    /// Everything `endpoint` calls.
    #[must_use]
    pub fn callees(&self, endpoint: &FactEndpoint) -> Vec<&FactEndpoint> {
        self.neighbors(endpoint, Predicate::Calls)
    }

    /// Everything that calls `endpoint`.
    #[must_use]
    pub fn callers(&self, endpoint: &FactEndpoint) -> Vec<&FactEndpoint> {
        let Some(idx) = self.find(endpoint) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == Predicate::Calls)
            .filter_map(|e| self.graph.node_weight(e.source()))
            .collect()
    }

    /// Outgoing dependency edges.
    #[must_use]
    pub fn dependencies(&self, endpoint: &FactEndpoint) -> Vec<&FactEndpoint> {
        self.neighbors(endpoint, Predicate::DependsOn)
    }

    /// Endpoints reachable from `endpoint` within `max_depth` hops,
    /// breadth-first, with their distance. The start node is excluded.
    #[must_use]
    pub fn related(&self, endpoint: &FactEndpoint, max_depth: usize) -> Vec<(&FactEndpoint, usize)> {
        let Some(start) = self.find(endpoint) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        visited.insert(start);
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.graph.edges(current) {
                let target = edge.target();
                if visited.insert(target) {
                    if let Some(weight) = self.graph.node_weight(target) {
                        result.push((weight, depth + 1));
                    }
                    queue.push_back((target, depth + 1));
                }
            }
        }

        result
    }

    /// Endpoints ranked by total degree, ties broken by display name for a
    /// stable ordering.
    #[must_use]
    pub fn top_connected(&self, limit: usize) -> Vec<(&FactEndpoint, usize)> {
        let mut ranked: Vec<(&FactEndpoint, usize)> = self
            .graph
            .node_indices()
            .filter_map(|idx| {
                let weight = self.graph.node_weight(idx)?;
                let degree = self
                    .graph
                    .edges_directed(idx, Direction::Outgoing)
                    .count()
                    + self.graph.edges_directed(idx, Direction::Incoming).count();
                Some((weight, degree))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
        ranked.truncate(limit);
        ranked
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fact, FactRecord, Provenance};
    use pretty_assertions::assert_eq;
    use symkg_protocol::{ContextTag, SymbolKind};

    fn call(caller: &str, callee: &str) -> FactRecord {
        FactRecord::new(
            Fact::new(
                FactEndpoint::symbol(caller, SymbolKind::Function),
                Predicate::Calls,
                FactEndpoint::symbol(callee, SymbolKind::Function),
                ContextTag::CallGraph,
            ),
            Provenance::new("main.py", 1),
        )
    }

    fn seeded_store() -> FactStore {
        let store = FactStore::new();
        store
            .upsert(vec![call("main", "check"), call("check", "fetch"), call("main", "render")])
            .unwrap();
        store
    }

    #[test]
    fn callees_and_callers_follow_call_edges() {
        let graph = FactGraph::from_store(&seeded_store());
        let main = FactEndpoint::symbol("main", SymbolKind::Function);
        let check = FactEndpoint::symbol("check", SymbolKind::Function);

        let mut callees: Vec<String> = graph.callees(&main).iter().map(|e| e.to_string()).collect();
        callees.sort();
        assert_eq!(callees, vec!["function:check", "function:render"]);

        let callers: Vec<String> = graph.callers(&check).iter().map(|e| e.to_string()).collect();
        assert_eq!(callers, vec!["function:main"]);
    }

    #[test]
    fn related_walks_within_depth() {
        let graph = FactGraph::from_store(&seeded_store());
        let main = FactEndpoint::symbol("main", SymbolKind::Function);

        let one_hop = graph.related(&main, 1);
        assert_eq!(one_hop.len(), 2);

        let two_hops = graph.related(&main, 2);
        assert_eq!(two_hops.len(), 3);
        assert!(two_hops
            .iter()
            .any(|(e, depth)| e.to_string() == "function:fetch" && *depth == 2));
    }

    #[test]
    fn top_connected_ranks_by_degree() {
        let graph = FactGraph::from_store(&seeded_store());
        let top = graph.top_connected(1);
        assert_eq!(top.len(), 1);
        // main and check both touch two edges; the name tiebreak is stable.
        assert_eq!(top[0].0.to_string(), "function:check");
        assert_eq!(top[0].1, 2);
    }

    #[test]
    fn missing_endpoint_yields_empty_results() {
        let graph = FactGraph::from_store(&seeded_store());
        let ghost = FactEndpoint::literal("ghost");
        assert!(graph.callees(&ghost).is_empty());
        assert!(graph.related(&ghost, 3).is_empty());
    }
}
