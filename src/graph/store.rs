//! Graph persistence collaborator
//!
//! The engine never decides how or where the graph is stored. It only asks a
//! [`GraphStore`] to load the graph at startup or on reload, and to save it
//! after each accepted mutation.

use crate::error::{StoreError, StoreResult};
use crate::graph::types::PermissionGraph;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Load/save capability provided by the persistence layer
pub trait GraphStore: Send + Sync {
    /// Load the current persisted graph
    fn load(&self) -> StoreResult<PermissionGraph>;

    /// Persist the given graph
    fn save(&self, graph: &PermissionGraph) -> StoreResult<()>;
}

/// Store backed by a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl GraphStore for JsonFileStore {
    fn load(&self) -> StoreResult<PermissionGraph> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "Graph file not found, using default graph");
            return Ok(PermissionGraph::default());
        }

        let json =
            fs::read_to_string(&self.path).map_err(|e| StoreError::io(self.display_path(), e))?;
        let graph: PermissionGraph = serde_json::from_str(&json)?;

        debug!(
            path = %self.path.display(),
            groups = graph.groups().len(),
            users = graph.users().len(),
            "Loaded permission graph"
        );
        Ok(graph)
    }

    fn save(&self, graph: &PermissionGraph) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(self.display_path(), e))?;
        }

        let json = serde_json::to_string_pretty(graph)?;
        fs::write(&self.path, json).map_err(|e| StoreError::io(self.display_path(), e))?;

        debug!(path = %self.path.display(), "Saved permission graph");
        Ok(())
    }
}

/// In-memory store that keeps the last saved snapshot
///
/// Useful for embedding the engine without a backing file and for tests that
/// need to observe persistence calls.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<PermissionGraph>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose first `load` returns the given graph
    pub fn with_graph(graph: PermissionGraph) -> Self {
        Self {
            snapshot: Mutex::new(Some(graph)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Last saved (or seeded) graph
    pub fn snapshot(&self) -> Option<PermissionGraph> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| {
                warn!("memory store lock poisoned, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    /// Overwrite the stored graph without counting a save, as an external edit would
    pub fn set_snapshot(&self, graph: PermissionGraph) {
        *self.snapshot.lock().unwrap_or_else(|poisoned| {
            warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        }) = Some(graph);
    }
}

impl GraphStore for MemoryStore {
    fn load(&self) -> StoreResult<PermissionGraph> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, graph: &PermissionGraph) -> StoreResult<()> {
        self.set_snapshot(graph.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
