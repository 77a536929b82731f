//! Bipartite repository/person graph
//!
//! This module provides the graph the crawler grows:
//! - `ProjectGraph`: keyed, undirected graph of repository and person nodes
//! - `SharedGraph`: the lock-protected handle shared by the driver and import tasks
//! - `Node`, `NodeKind`, `Relation`: node payloads and edge classification
//!
//! Node and edge attributes keep the exchange-format names: nodes expose
//! `bipartite` (0 = repository, 1 = person), `language` and `weight`; edges
//! expose `relation`.

mod project_graph;
mod shared;

pub use project_graph::{EdgeView, ProjectGraph};
pub use shared::SharedGraph;

use std::fmt;

/// Language recorded for repositories whose primary language is unknown
pub const UNKNOWN_LANGUAGE: &str = "?";

/// Which side of the bipartite graph a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Repository,
    Person,
}

impl NodeKind {
    /// Returns the `bipartite` attribute value for this kind
    pub fn bipartite(&self) -> u8 {
        match self {
            Self::Repository => 0,
            Self::Person => 1,
        }
    }

    /// Parses a `bipartite` attribute value
    pub fn from_bipartite(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Repository),
            1 => Some(Self::Person),
            _ => None,
        }
    }
}

/// Why a person is linked to a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Owner,
    Contributor,
    Committer,
}

impl Relation {
    /// Returns the `relation` attribute value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Contributor => "contributor",
            Self::Committer => "committer",
        }
    }

    /// Parses a `relation` attribute value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "contributor" => Some(Self::Contributor),
            "committer" => Some(Self::Committer),
            _ => None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryNode {
    /// Full name, e.g. `owner/name`
    pub name: String,

    /// Best-guess primary language, `?` when unknown
    pub language: String,

    /// Popularity proxy (stars or watchers)
    pub weight: u64,
}

/// A person vertex, keyed by login or email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonNode {
    pub id: String,
}

/// Payload stored on every graph vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Repository(RepositoryNode),
    Person(PersonNode),
}

impl Node {
    /// The unique key of this node
    pub fn key(&self) -> &str {
        match self {
            Self::Repository(repo) => &repo.name,
            Self::Person(person) => &person.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Repository(_) => NodeKind::Repository,
            Self::Person(_) => NodeKind::Person,
        }
    }

    pub fn as_repository(&self) -> Option<&RepositoryNode> {
        match self {
            Self::Repository(repo) => Some(repo),
            Self::Person(_) => None,
        }
    }
}
