//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::PassReport;
use crate::graph::{Node, NodeKind, ProjectGraph, Relation, UNKNOWN_LANGUAGE};
use crate::state::{CrawlCursor, PassStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{PassRecord, SessionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl Storage for SqliteStorage {
    // ===== Graph Snapshot =====

    fn save_graph(&mut self, graph: &ProjectGraph) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;

        {
            let mut insert_node = tx.prepare(
                "INSERT INTO nodes (key, bipartite, language, weight) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for node in graph.nodes() {
                match node {
                    Node::Repository(repo) => insert_node.execute(params![
                        repo.name,
                        NodeKind::Repository.bipartite(),
                        repo.language,
                        to_i64(repo.weight)
                    ])?,
                    Node::Person(person) => insert_node.execute(params![
                        person.id,
                        NodeKind::Person.bipartite(),
                        Option::<String>::None,
                        Option::<i64>::None
                    ])?,
                };
            }

            let mut insert_edge = tx.prepare(
                "INSERT INTO edges (person, repository, relation) VALUES (?1, ?2, ?3)",
            )?;
            for edge in graph.edges() {
                insert_edge.execute(params![edge.person, edge.repository, edge.relation.as_str()])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            "Saved graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(())
    }

    fn load_graph(&self) -> StorageResult<ProjectGraph> {
        let mut graph = ProjectGraph::new();

        let mut stmt = self
            .conn
            .prepare("SELECT key, bipartite, language, weight FROM nodes ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;
        for row in rows {
            let (key, bipartite, language, weight) = row?;
            match NodeKind::from_bipartite(bipartite) {
                Some(NodeKind::Repository) => {
                    graph.add_repository(
                        &key,
                        language.as_deref().unwrap_or(UNKNOWN_LANGUAGE),
                        weight.map(to_u64).unwrap_or(0),
                    );
                }
                Some(NodeKind::Person) => {
                    graph.add_person(&key);
                }
                None => {
                    return Err(StorageError::Corrupt(format!(
                        "node {} has bipartite value {}",
                        key, bipartite
                    )))
                }
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT person, repository, relation FROM edges ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (person, repository, relation) = row?;
            let relation = Relation::parse(&relation).ok_or_else(|| {
                StorageError::Corrupt(format!("edge {} -> {} has relation {}", person, repository, relation))
            })?;
            if !graph.link(&person, &repository, relation) {
                return Err(StorageError::Corrupt(format!(
                    "edge {} -> {} does not join a person and a repository",
                    person, repository
                )));
            }
        }

        Ok(graph)
    }

    fn clear_graph(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;
        tx.commit()?;
        Ok(())
    }

    // ===== Sessions =====

    fn load_session(&self, key: &str) -> StorageResult<Option<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_key, source, query, since, cursor_offset, completed, remaining, updated_at
             FROM sessions WHERE session_key = ?1",
        )?;

        let session = stmt
            .query_row(params![key], |row| {
                Ok(SessionRecord {
                    key: row.get(0)?,
                    source: row.get(1)?,
                    query: row.get(2)?,
                    since: row.get(3)?,
                    cursor: CrawlCursor {
                        offset: to_u64(row.get(4)?),
                        completed: row.get::<_, i64>(5)? != 0,
                    },
                    remaining: row.get::<_, Option<i64>>(6)?.map(to_u64),
                    updated_at: row.get(7)?,
                })
            })
            .optional()?;

        Ok(session)
    }

    fn save_session(&mut self, session: &SessionRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (session_key, source, query, since, cursor_offset, completed, remaining, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(session_key) DO UPDATE SET
                cursor_offset = excluded.cursor_offset,
                completed = excluded.completed,
                remaining = excluded.remaining,
                updated_at = excluded.updated_at",
            params![
                session.key,
                session.source,
                session.query,
                session.since,
                to_i64(session.cursor.offset),
                session.cursor.completed,
                session.remaining.map(to_i64),
                session.updated_at
            ],
        )?;
        Ok(())
    }

    fn delete_session(&mut self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE session_key = ?1", params![key])?;
        Ok(())
    }

    // ===== Pass Log =====

    fn record_pass(
        &mut self,
        session_key: &str,
        report: &PassReport,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO passes (session_key, status, analyzed, added, cursor_offset, error, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_key,
                report.status.to_db_string(),
                to_i64(report.analyzed),
                to_i64(report.added),
                to_i64(report.offset),
                report.error,
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_passes(&self, session_key: Option<&str>) -> StorageResult<Vec<PassRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_key, status, analyzed, added, cursor_offset, error, started_at, finished_at
             FROM passes WHERE ?1 IS NULL OR session_key = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![session_key], |row| {
            let status: String = row.get(2)?;
            Ok((
                status,
                PassRecord {
                    id: row.get(0)?,
                    session_key: row.get(1)?,
                    status: PassStatus::Exhausted,
                    analyzed: to_u64(row.get(3)?),
                    added: to_u64(row.get(4)?),
                    offset: to_u64(row.get(5)?),
                    error: row.get(6)?,
                    started_at: row.get(7)?,
                    finished_at: row.get(8)?,
                },
            ))
        })?;

        let mut passes = Vec::new();
        for row in rows {
            let (status, mut record) = row?;
            record.status = PassStatus::from_db_string(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown pass status {}", status)))?;
            passes.push(record);
        }
        Ok(passes)
    }
}
