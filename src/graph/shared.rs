use crate::graph::ProjectGraph;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock-protected graph shared between the driver and concurrent import tasks
///
/// Every mutation goes through `lock()`. Critical sections are kept to a
/// single check-and-insert; no lock is ever held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<Mutex<ProjectGraph>>,
}

impl SharedGraph {
    /// Wraps an existing graph (e.g. a loaded snapshot)
    pub fn new(graph: ProjectGraph) -> Self {
        Self {
            inner: Arc::new(Mutex::new(graph)),
        }
    }

    /// Acquires the graph-wide lock
    ///
    /// The graph is consistent between critical sections, so a poisoned lock
    /// is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, ProjectGraph> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a point-in-time copy of the graph
    pub fn snapshot(&self) -> ProjectGraph {
        self.lock().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn repository_count(&self) -> usize {
        self.lock().repository_count()
    }
}

impl From<ProjectGraph> for SharedGraph {
    fn from(graph: ProjectGraph) -> Self {
        Self::new(graph)
    }
}
