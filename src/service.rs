//! Permission service
//!
//! The single gateway through which callers query and mutate the permission
//! graph. Every accepted mutation invalidates the affected cache scope before
//! the write lock is released and is then handed to the [`GraphStore`].
//!
//! User-level mutations drop only that user's cached results. Group-level
//! and default-group mutations can affect any user, so they drop everything.

use crate::config::CacheConfig;
use crate::error::{GraphError, GraphResult, StoreResult};
use crate::graph::types::{push_unique, remove_value};
use crate::graph::{GraphStore, MemoryStore, PermissionGraph};
use crate::resolver::{CacheStats, PatternMatcher, PermissionResolver, Resolution, ResultCache};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Cache scope dropped by a mutation
#[derive(Debug, Clone, Copy)]
enum Invalidation<'a> {
    User(&'a str),
    All,
}

/// Shared permission service
pub struct PermissionService {
    graph: RwLock<PermissionGraph>,
    cache: ResultCache,
    matcher: PatternMatcher,
    store: Arc<dyn GraphStore>,
}

impl PermissionService {
    /// Create a service over an already loaded graph
    pub fn new(graph: PermissionGraph, store: Arc<dyn GraphStore>, cache: &CacheConfig) -> Self {
        Self {
            graph: RwLock::new(graph),
            cache: ResultCache::new(cache),
            matcher: PatternMatcher::new(),
            store,
        }
    }

    /// Load the graph from the store and create a service over it
    pub fn load(store: Arc<dyn GraphStore>, cache: &CacheConfig) -> StoreResult<Self> {
        let graph = store.load()?;
        info!(
            default_group = graph.default_group_id(),
            groups = graph.groups().len(),
            users = graph.users().len(),
            "Permission graph loaded"
        );
        Ok(Self::new(graph, store, cache))
    }

    /// Service backed by a [`MemoryStore`] with default cache settings
    pub fn in_memory(graph: PermissionGraph) -> Self {
        Self::new(
            graph,
            Arc::new(MemoryStore::new()),
            &CacheConfig::default(),
        )
    }

    // Lock helpers recover from poisoning by logging and continuing with the data

    fn read_graph(&self) -> RwLockReadGuard<'_, PermissionGraph> {
        self.graph.read().unwrap_or_else(|poisoned| {
            warn!("permission graph lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_graph(&self) -> RwLockWriteGuard<'_, PermissionGraph> {
        self.graph.write().unwrap_or_else(|poisoned| {
            warn!("permission graph lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check whether a user holds a permission node
    ///
    /// Never fails: empty input, unknown users and unknown groups all resolve
    /// to a plain `false` or fall through to the default group.
    pub fn has_permission(&self, user_id: &str, node: &str) -> bool {
        if user_id.is_empty() || node.is_empty() {
            return false;
        }

        if let Some(cached) = self.cache.get(user_id, node) {
            return cached;
        }

        let epoch = self.cache.epoch();
        let allowed = {
            let graph = self.read_graph();
            PermissionResolver::new(&graph, &self.matcher).allowed(user_id, node)
        };
        self.cache.insert(user_id, node, allowed, epoch);
        allowed
    }

    /// Resolve without the cache and report which rule decided
    pub fn explain(&self, user_id: &str, node: &str) -> Resolution {
        let graph = self.read_graph();
        PermissionResolver::new(&graph, &self.matcher).explain(user_id, node)
    }

    /// Group used for the user's display attributes
    pub fn effective_group(&self, user_id: &str) -> Option<String> {
        let graph = self.read_graph();
        PermissionResolver::new(&graph, &self.matcher)
            .effective_group(user_id)
            .map(str::to_string)
    }

    pub fn user_prefix(&self, user_id: &str) -> String {
        let graph = self.read_graph();
        PermissionResolver::new(&graph, &self.matcher)
            .prefix(user_id)
            .to_string()
    }

    pub fn user_suffix(&self, user_id: &str) -> String {
        let graph = self.read_graph();
        PermissionResolver::new(&graph, &self.matcher)
            .suffix(user_id)
            .to_string()
    }

    /// All groups the user inherits from, direct groups first
    pub fn inherited_groups(&self, user_id: &str) -> Vec<String> {
        let graph = self.read_graph();
        PermissionResolver::new(&graph, &self.matcher)
            .inherited_groups(user_id)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn user_id_by_name(&self, username: &str) -> Option<String> {
        self.read_graph()
            .user_id_by_name(username)
            .map(str::to_string)
    }

    /// Run a read-only closure against the current graph
    pub fn with_graph<R>(&self, f: impl FnOnce(&PermissionGraph) -> R) -> R {
        f(&*self.read_graph())
    }

    /// Clone of the current graph
    pub fn snapshot(&self) -> PermissionGraph {
        self.read_graph().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Invalidation hooks
    // =========================================================================

    /// Drop every cached result (for mutation paths outside this service)
    pub fn clear_cache(&self) {
        self.cache.drop_all();
    }

    /// Drop one user's cached results
    pub fn clear_user_cache(&self, user_id: &str) {
        self.cache.drop_user(user_id);
    }

    // =========================================================================
    // Mutation gateway
    // =========================================================================

    /// Apply a mutation; `Ok(false)` from the closure means nothing changed
    fn mutate<F>(&self, scope: Invalidation<'_>, action: &'static str, apply: F) -> GraphResult<bool>
    where
        F: FnOnce(&mut PermissionGraph) -> GraphResult<bool>,
    {
        {
            let mut graph = self.write_graph();
            if !apply(&mut *graph)? {
                debug!(action, "Mutation was a no-op");
                return Ok(false);
            }
            match scope {
                Invalidation::User(user_id) => self.cache.drop_user(user_id),
                Invalidation::All => self.cache.drop_all(),
            }
        }

        info!(action, scope = ?scope, "Permission graph updated");
        self.persist();
        Ok(true)
    }

    /// Hand the current graph to the store; failures do not undo the change
    fn persist(&self) {
        let graph = self.read_graph();
        if let Err(e) = self.store.save(&graph) {
            error!(error = %e, "Failed to persist permission graph");
        }
    }

    // --- User mutations ------------------------------------------------------

    /// Add a user to a group, creating the user entry if needed
    pub fn add_user_to_group(&self, user_id: &str, group_id: &str) -> GraphResult<bool> {
        require(user_id, "user id")?;
        require(group_id, "group id")?;
        self.mutate(Invalidation::User(user_id), "add_user_to_group", |graph| {
            if !graph.has_group(group_id) {
                return Err(GraphError::GroupNotFound(group_id.to_string()));
            }
            Ok(push_unique(&mut graph.user_entry(user_id).groups, group_id))
        })
    }

    pub fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> GraphResult<bool> {
        require(user_id, "user id")?;
        self.mutate(Invalidation::User(user_id), "remove_user_from_group", |graph| {
            Ok(remove_value(&mut graph.user_mut(user_id)?.groups, group_id))
        })
    }

    /// Grant (or, with a `-` token, deny) a node directly to a user
    pub fn add_user_permission(&self, user_id: &str, permission: &str) -> GraphResult<bool> {
        self.add_user_permissions(user_id, &[permission])
    }

    pub fn remove_user_permission(&self, user_id: &str, permission: &str) -> GraphResult<bool> {
        self.remove_user_permissions(user_id, &[permission])
    }

    pub fn add_user_permissions(&self, user_id: &str, permissions: &[&str]) -> GraphResult<bool> {
        require(user_id, "user id")?;
        require_all(permissions)?;
        self.mutate(Invalidation::User(user_id), "add_user_permissions", |graph| {
            let list = &mut graph.user_entry(user_id).permissions;
            Ok(permissions
                .iter()
                .fold(false, |changed, perm| push_unique(list, perm) | changed))
        })
    }

    pub fn remove_user_permissions(&self, user_id: &str, permissions: &[&str]) -> GraphResult<bool> {
        require(user_id, "user id")?;
        self.mutate(Invalidation::User(user_id), "remove_user_permissions", |graph| {
            let list = &mut graph.user_mut(user_id)?.permissions;
            Ok(permissions
                .iter()
                .fold(false, |changed, perm| remove_value(list, perm) | changed))
        })
    }

    /// Register a user sighting: create the entry, assign the default group
    /// when the user has none, and refresh the last-seen username
    pub fn record_login(&self, user_id: &str, username: &str) -> GraphResult<bool> {
        require(user_id, "user id")?;
        self.mutate(Invalidation::User(user_id), "record_login", |graph| {
            let default_group = graph.default_group_id().to_string();
            let has_default = graph.has_group(&default_group);
            let user = graph.user_entry(user_id);

            let mut changed = false;
            if user.groups.is_empty() && has_default {
                user.groups.push(default_group);
                changed = true;
            }
            if !username.is_empty() && user.username.as_deref() != Some(username) {
                user.username = Some(username.to_string());
                changed = true;
            }
            Ok(changed)
        })
    }

    // --- Group mutations -----------------------------------------------------

    pub fn create_group(&self, group_id: &str) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "create_group", |graph| {
            graph.insert_group(group_id).map(|_| true)
        })
    }

    /// Delete a group; references to it are left dangling and resolve as absent
    pub fn delete_group(&self, group_id: &str) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "delete_group", |graph| {
            graph.remove_group(group_id).map(|_| true)
        })
    }

    /// Rename a group, rewriting memberships, parents and the default group id
    pub fn rename_group(&self, old_id: &str, new_id: &str) -> GraphResult<bool> {
        if old_id == new_id {
            return Ok(false);
        }
        self.mutate(Invalidation::All, "rename_group", |graph| {
            graph.rename_group(old_id, new_id).map(|_| true)
        })
    }

    pub fn add_group_permission(&self, group_id: &str, permission: &str) -> GraphResult<bool> {
        self.add_group_permissions(group_id, &[permission])
    }

    pub fn remove_group_permission(&self, group_id: &str, permission: &str) -> GraphResult<bool> {
        self.remove_group_permissions(group_id, &[permission])
    }

    pub fn add_group_permissions(&self, group_id: &str, permissions: &[&str]) -> GraphResult<bool> {
        require_all(permissions)?;
        self.mutate(Invalidation::All, "add_group_permissions", |graph| {
            let list = &mut graph.group_mut(group_id)?.permissions;
            Ok(permissions
                .iter()
                .fold(false, |changed, perm| push_unique(list, perm) | changed))
        })
    }

    pub fn remove_group_permissions(
        &self,
        group_id: &str,
        permissions: &[&str],
    ) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "remove_group_permissions", |graph| {
            let list = &mut graph.group_mut(group_id)?.permissions;
            Ok(permissions
                .iter()
                .fold(false, |changed, perm| remove_value(list, perm) | changed))
        })
    }

    /// Append a parent; both groups must exist and differ
    pub fn add_parent(&self, group_id: &str, parent_id: &str) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "add_parent", |graph| {
            graph.check_parent(group_id, parent_id)?;
            Ok(push_unique(&mut graph.group_mut(group_id)?.parents, parent_id))
        })
    }

    pub fn remove_parent(&self, group_id: &str, parent_id: &str) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "remove_parent", |graph| {
            Ok(remove_value(&mut graph.group_mut(group_id)?.parents, parent_id))
        })
    }

    /// Replace the whole parent list (duplicates are collapsed, order kept)
    pub fn set_parents(&self, group_id: &str, parents: &[&str]) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "set_parents", |graph| {
            let mut validated = Vec::with_capacity(parents.len());
            for parent in parents {
                graph.check_parent(group_id, parent)?;
                push_unique(&mut validated, parent);
            }
            let group = graph.group_mut(group_id)?;
            if group.parents == validated {
                return Ok(false);
            }
            group.parents = validated;
            Ok(true)
        })
    }

    pub fn set_priority(&self, group_id: &str, priority: i32) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "set_priority", |graph| {
            let group = graph.group_mut(group_id)?;
            let changed = group.priority != priority;
            group.priority = priority;
            Ok(changed)
        })
    }

    pub fn set_prefix(&self, group_id: &str, prefix: &str) -> GraphResult<bool> {
        let prefix = prefix.trim();
        self.mutate(Invalidation::All, "set_prefix", |graph| {
            let group = graph.group_mut(group_id)?;
            let changed = group.prefix != prefix;
            group.prefix = prefix.to_string();
            Ok(changed)
        })
    }

    pub fn set_suffix(&self, group_id: &str, suffix: &str) -> GraphResult<bool> {
        let suffix = suffix.trim();
        self.mutate(Invalidation::All, "set_suffix", |graph| {
            let group = graph.group_mut(group_id)?;
            let changed = group.suffix != suffix;
            group.suffix = suffix.to_string();
            Ok(changed)
        })
    }

    pub fn set_default_group(&self, group_id: &str) -> GraphResult<bool> {
        self.mutate(Invalidation::All, "set_default_group", |graph| {
            if !graph.has_group(group_id) {
                return Err(GraphError::GroupNotFound(group_id.to_string()));
            }
            let changed = graph.default_group != group_id;
            graph.default_group = group_id.to_string();
            Ok(changed)
        })
    }

    // --- Whole graph ---------------------------------------------------------

    /// Replace the in-memory graph with the store's current contents
    pub fn reload(&self) -> StoreResult<()> {
        let graph = self.store.load()?;
        self.install(graph);
        info!("Permission graph reloaded");
        Ok(())
    }

    /// Swap in a new graph without persisting it
    pub fn replace_graph(&self, graph: PermissionGraph) {
        self.install(graph);
        info!("Permission graph replaced");
    }

    fn install(&self, graph: PermissionGraph) {
        let mut current = self.write_graph();
        *current = graph;
        self.cache.drop_all();
        self.matcher.clear();
    }
}

fn require(value: &str, field: &'static str) -> GraphResult<()> {
    if value.is_empty() {
        return Err(GraphError::empty(field));
    }
    Ok(())
}

fn require_all(permissions: &[&str]) -> GraphResult<()> {
    permissions
        .iter()
        .try_for_each(|perm| require(perm, "permission"))
}
