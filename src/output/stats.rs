//! Statistics generation from the crawl graph
//!
//! This module provides functionality for extracting and displaying
//! graph statistics and the pass log.

use crate::graph::{ProjectGraph, Relation};
use crate::output::OutputResult;
use crate::storage::{PassRecord, Storage};
use std::collections::HashMap;

/// Number of languages listed by `print_statistics`
const TOP_LANGUAGES: usize = 10;

/// Graph statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStatistics {
    /// Number of repository nodes
    pub repositories: u64,

    /// Number of person nodes
    pub people: u64,

    /// Number of edges
    pub edges: u64,

    /// Edge count per relation, in owner/contributor/committer order
    pub relations: Vec<(Relation, u64)>,

    /// Repositories per language, most common first
    pub languages: Vec<(String, u64)>,

    /// Number of connected components
    pub connected_components: u64,
}

/// Computes statistics for a graph
pub fn compute_statistics(graph: &ProjectGraph) -> GraphStatistics {
    let mut relation_counts: HashMap<Relation, u64> = HashMap::new();
    for edge in graph.edges() {
        *relation_counts.entry(edge.relation).or_default() += 1;
    }
    let relations = [Relation::Owner, Relation::Contributor, Relation::Committer]
        .into_iter()
        .map(|r| (r, relation_counts.get(&r).copied().unwrap_or(0)))
        .collect();

    let mut language_counts: HashMap<&str, u64> = HashMap::new();
    for repo in graph.repositories() {
        *language_counts.entry(repo.language.as_str()).or_default() += 1;
    }
    let mut languages: Vec<(String, u64)> = language_counts
        .into_iter()
        .map(|(language, count)| (language.to_string(), count))
        .collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    GraphStatistics {
        repositories: graph.repository_count() as u64,
        people: graph.person_count() as u64,
        edges: graph.edge_count() as u64,
        relations,
        languages,
        connected_components: graph.connected_components() as u64,
    }
}

/// Loads the stored graph and computes its statistics
///
/// # Arguments
///
/// * `storage` - The storage backend to query
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<GraphStatistics> {
    let graph = storage.load_graph()?;
    Ok(compute_statistics(&graph))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &GraphStatistics) {
    println!("=== Graph Statistics ===\n");

    println!("Overview:");
    println!("  Repositories: {}", stats.repositories);
    println!("  People: {}", stats.people);
    println!("  Edges: {}", stats.edges);
    println!("  Connected components: {}", stats.connected_components);
    println!();

    println!("Edges by Relation:");
    for (relation, count) in &stats.relations {
        let percentage = if stats.edges > 0 {
            (*count as f64 / stats.edges as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", relation, count, percentage);
    }
    println!();

    if !stats.languages.is_empty() {
        println!("Top Languages:");
        for (language, count) in stats.languages.iter().take(TOP_LANGUAGES) {
            println!("  {}: {}", language, count);
        }
        println!();
    }
}

/// Prints the pass log to stdout
pub fn print_pass_log(passes: &[PassRecord]) {
    if passes.is_empty() {
        println!("No passes recorded.");
        return;
    }

    println!("=== Pass Log ({}) ===\n", passes.len());
    for pass in passes {
        println!(
            "  #{} {} {}: {} analyzed, {} added, offset {}",
            pass.id, pass.finished_at, pass.status, pass.analyzed, pass.added, pass.offset
        );
        if let Some(error) = &pass.error {
            println!("      error: {}", error);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UNKNOWN_LANGUAGE;

    #[test]
    fn test_compute_statistics() {
        let mut graph = ProjectGraph::new();
        graph.add_repository("a/x", "Rust", 3);
        graph.add_repository("b/y", "Rust", 1);
        graph.add_repository("c/z", UNKNOWN_LANGUAGE, 0);
        graph.link("alice", "a/x", Relation::Owner);
        graph.link("dev", "a/x", Relation::Contributor);
        graph.link("dev", "b/y", Relation::Contributor);

        let stats = compute_statistics(&graph);

        assert_eq!(stats.repositories, 3);
        assert_eq!(stats.people, 2);
        assert_eq!(stats.edges, 3);
        assert_eq!(
            stats.relations,
            vec![
                (Relation::Owner, 1),
                (Relation::Contributor, 2),
                (Relation::Committer, 0)
            ]
        );
        assert_eq!(stats.languages[0], ("Rust".to_string(), 2));
        assert_eq!(stats.connected_components, 2);
    }

    #[test]
    fn test_empty_graph_statistics() {
        let stats = compute_statistics(&ProjectGraph::new());
        assert_eq!(stats.repositories, 0);
        assert_eq!(stats.connected_components, 0);
        assert!(stats.languages.is_empty());
    }
}
