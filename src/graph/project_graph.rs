//! Keyed bipartite graph backed by petgraph
//!
//! Nodes live in a `StableUnGraph` so that removing one repository during a
//! rollback never invalidates the indices held for the rest of the graph.

use crate::graph::{Node, NodeKind, PersonNode, Relation, RepositoryNode};
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};

/// A person/repository edge as seen from outside the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeView<'a> {
    pub person: &'a str,
    pub repository: &'a str,
    pub relation: Relation,
}

/// Undirected, attributed graph of repositories and people
///
/// Keys are unique across both node kinds. Adding a key that already exists
/// never creates a second node.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    graph: StableUnGraph<Node, Relation>,
    index: HashMap<String, NodeIndex>,
}

impl ProjectGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a node with this key exists
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Gets a node by key
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.index.get(key).and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Gets a repository node by its full name
    pub fn repository(&self, name: &str) -> Option<&RepositoryNode> {
        self.node(name).and_then(Node::as_repository)
    }

    /// Adds a repository node
    ///
    /// Returns false (and leaves the graph untouched) if the key is already taken.
    pub fn add_repository(&mut self, name: &str, language: &str, weight: u64) -> bool {
        self.insert(Node::Repository(RepositoryNode {
            name: name.to_string(),
            language: language.to_string(),
            weight,
        }))
    }

    /// Adds a person node
    ///
    /// Returns false if the key is already taken.
    pub fn add_person(&mut self, id: &str) -> bool {
        self.insert(Node::Person(PersonNode { id: id.to_string() }))
    }

    fn insert(&mut self, node: Node) -> bool {
        if self.index.contains_key(node.key()) {
            return false;
        }
        let key = node.key().to_string();
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        true
    }

    /// Links a person to a repository
    ///
    /// The person node is created if missing. A second link between the same
    /// pair refreshes the relation instead of adding a parallel edge. Returns
    /// false if either key resolves to a node of the wrong kind, or the
    /// repository does not exist.
    pub fn link(&mut self, person: &str, repository: &str, relation: Relation) -> bool {
        let Some(repo_idx) = self.index_of(repository, NodeKind::Repository) else {
            return false;
        };

        if !self.contains(person) {
            self.add_person(person);
        }
        let Some(person_idx) = self.index_of(person, NodeKind::Person) else {
            return false;
        };

        match self.graph.find_edge(person_idx, repo_idx) {
            Some(edge) => self.graph[edge] = relation,
            None => {
                self.graph.add_edge(person_idx, repo_idx, relation);
            }
        }
        true
    }

    fn index_of(&self, key: &str, kind: NodeKind) -> Option<NodeIndex> {
        let idx = *self.index.get(key)?;
        self.graph
            .node_weight(idx)
            .filter(|node| node.kind() == kind)
            .map(|_| idx)
    }

    /// Copies every node and edge of `other` that this graph lacks
    ///
    /// Existing nodes and relations win over the incoming ones. Returns the
    /// number of repositories added.
    pub fn merge(&mut self, other: &ProjectGraph) -> usize {
        let mut added = 0;
        for node in other.nodes() {
            if self.insert(node.clone()) && node.kind() == NodeKind::Repository {
                added += 1;
            }
        }
        for edge in other.edges() {
            if self.relation(edge.person, edge.repository).is_none() {
                self.link(edge.person, edge.repository, edge.relation);
            }
        }
        added
    }

    /// Removes a node and every edge touching it
    ///
    /// Returns the removed payload, if the key existed.
    pub fn remove_node(&mut self, key: &str) -> Option<Node> {
        let idx = self.index.remove(key)?;
        self.graph.remove_node(idx)
    }

    /// Gets the relation between a person and a repository, if linked
    pub fn relation(&self, person: &str, repository: &str) -> Option<Relation> {
        let a = *self.index.get(person)?;
        let b = *self.index.get(repository)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Returns the number of edges touching a node (0 for unknown keys)
    pub fn degree(&self, key: &str) -> usize {
        self.index
            .get(key)
            .map(|idx| self.graph.neighbors(*idx).count())
            .unwrap_or(0)
    }

    /// Returns the keys of a node's neighbours
    pub fn neighbors(&self, key: &str) -> Vec<&str> {
        let Some(idx) = self.index.get(key) else {
            return Vec::new();
        };
        self.graph
            .neighbors(*idx)
            .filter_map(|n| self.graph.node_weight(n))
            .map(Node::key)
            .collect()
    }

    /// Iterates over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Iterates over all repository nodes
    pub fn repositories(&self) -> impl Iterator<Item = &RepositoryNode> {
        self.nodes().filter_map(Node::as_repository)
    }

    /// Iterates over all edges, person side first
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.graph.edge_indices().filter_map(move |edge| {
            let (a, b) = self.graph.edge_endpoints(edge)?;
            let relation = *self.graph.edge_weight(edge)?;
            let a = self.graph.node_weight(a)?;
            let b = self.graph.node_weight(b)?;
            let (person, repository) = match (a, b) {
                (Node::Person(_), Node::Repository(_)) => (a.key(), b.key()),
                _ => (b.key(), a.key()),
            };
            Some(EdgeView {
                person,
                repository,
                relation,
            })
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn repository_count(&self) -> usize {
        self.repositories().count()
    }

    pub fn person_count(&self) -> usize {
        self.nodes()
            .filter(|node| node.kind() == NodeKind::Person)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Checks that every edge joins one repository and one person
    pub fn is_bipartite(&self) -> bool {
        self.graph.edge_indices().all(|edge| {
            self.graph
                .edge_endpoints(edge)
                .and_then(|(a, b)| Some((self.graph.node_weight(a)?, self.graph.node_weight(b)?)))
                .map(|(a, b)| a.kind() != b.kind())
                .unwrap_or(false)
        })
    }

    /// Counts connected components (isolated nodes count as one each)
    pub fn connected_components(&self) -> usize {
        let compact: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .enumerate()
            .map(|(i, idx)| (idx, i))
            .collect();

        let mut sets = UnionFind::new(compact.len());
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                if let (Some(&a), Some(&b)) = (compact.get(&a), compact.get(&b)) {
                    sets.union(a, b);
                }
            }
        }

        (0..compact.len())
            .map(|i| sets.find(i))
            .collect::<HashSet<_>>()
            .len()
    }
}
