//! Permission graph types
//!
//! The in-memory representation of groups and users. The graph is owned by
//! the persistence collaborator; the resolver only ever borrows it.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default group id used when none is configured
pub const DEFAULT_GROUP_ID: &str = "default";

/// A permission group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Permission tokens in listed order
    pub permissions: Vec<String>,
    /// Parent group ids, traversed in listed order
    pub parents: Vec<String>,
    /// Higher wins when choosing the effective group
    pub priority: i32,
    /// Display prefix
    pub prefix: String,
    /// Display suffix
    pub suffix: String,
}

impl Group {
    /// Create an empty group with the given priority
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    /// Builder-style helper used heavily by tests and fixtures
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper for parents
    pub fn parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }
}

/// A user (principal)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Last-seen display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Groups the user directly belongs to, in listed order
    pub groups: Vec<String>,
    /// Direct permission tokens; these override anything from groups
    pub permissions: Vec<String>,
}

impl User {
    pub fn in_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn named(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// The full permission graph
///
/// Maps are ordered by id so listings and tie-breaks are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionGraph {
    /// Fallback group for users with no explicit groups
    pub default_group: String,
    pub groups: BTreeMap<String, Group>,
    pub users: BTreeMap<String, User>,
}

impl Default for PermissionGraph {
    fn default() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(DEFAULT_GROUP_ID.to_string(), Group::default());
        Self {
            default_group: DEFAULT_GROUP_ID.to_string(),
            groups,
            users: BTreeMap::new(),
        }
    }
}

impl PermissionGraph {
    /// Create an empty graph with the given default group id (no groups defined)
    pub fn empty(default_group: impl Into<String>) -> Self {
        Self {
            default_group: default_group.into(),
            groups: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, id: impl Into<String>, group: Group) -> Self {
        self.groups.insert(id.into(), group);
        self
    }

    pub fn with_user(mut self, id: impl Into<String>, user: User) -> Self {
        self.users.insert(id.into(), user);
        self
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    pub fn users(&self) -> &BTreeMap<String, User> {
        &self.users
    }

    pub fn default_group_id(&self) -> &str {
        &self.default_group
    }

    pub fn has_group(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    /// Reverse lookup of a user id by last-seen username (case-insensitive)
    pub fn user_id_by_name(&self, username: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|(_, user)| {
                user.username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(username))
            })
            .map(|(id, _)| id.as_str())
    }

    // Raw setters. These do not touch any cache; go through
    // `PermissionService` for invalidation and persistence.

    pub(crate) fn group_mut(&mut self, id: &str) -> GraphResult<&mut Group> {
        self.groups
            .get_mut(id)
            .ok_or_else(|| GraphError::GroupNotFound(id.to_string()))
    }

    pub(crate) fn user_mut(&mut self, id: &str) -> GraphResult<&mut User> {
        self.users
            .get_mut(id)
            .ok_or_else(|| GraphError::UserNotFound(id.to_string()))
    }

    pub(crate) fn user_entry(&mut self, id: &str) -> &mut User {
        self.users.entry(id.to_string()).or_default()
    }

    pub(crate) fn insert_group(&mut self, id: &str) -> GraphResult<()> {
        if id.is_empty() {
            return Err(GraphError::empty("group id"));
        }
        if self.groups.contains_key(id) {
            return Err(GraphError::GroupExists(id.to_string()));
        }
        self.groups.insert(id.to_string(), Group::default());
        Ok(())
    }

    pub(crate) fn remove_group(&mut self, id: &str) -> GraphResult<Group> {
        if id == self.default_group {
            return Err(GraphError::DefaultGroupDeletion(id.to_string()));
        }
        self.groups
            .remove(id)
            .ok_or_else(|| GraphError::GroupNotFound(id.to_string()))
    }

    /// Rename a group and rewrite every reference to it
    pub(crate) fn rename_group(&mut self, old: &str, new: &str) -> GraphResult<()> {
        if new.is_empty() {
            return Err(GraphError::empty("group id"));
        }
        if !self.groups.contains_key(old) {
            return Err(GraphError::GroupNotFound(old.to_string()));
        }
        if self.groups.contains_key(new) {
            return Err(GraphError::GroupExists(new.to_string()));
        }

        if let Some(group) = self.groups.remove(old) {
            self.groups.insert(new.to_string(), group);
        }
        if self.default_group == old {
            self.default_group = new.to_string();
        }
        for user in self.users.values_mut() {
            replace_reference(&mut user.groups, old, new);
        }
        for group in self.groups.values_mut() {
            replace_reference(&mut group.parents, old, new);
        }
        Ok(())
    }

    pub(crate) fn check_parent(&self, group: &str, parent: &str) -> GraphResult<()> {
        if !self.groups.contains_key(group) {
            return Err(GraphError::GroupNotFound(group.to_string()));
        }
        if !self.groups.contains_key(parent) {
            return Err(GraphError::GroupNotFound(parent.to_string()));
        }
        if group == parent {
            return Err(GraphError::SelfParent(group.to_string()));
        }
        Ok(())
    }
}

/// Replace `old` with `new` in place, keeping position and avoiding duplicates
fn replace_reference(list: &mut Vec<String>, old: &str, new: &str) {
    let Some(pos) = list.iter().position(|g| g == old) else {
        return;
    };
    if list.iter().any(|g| g == new) {
        list.remove(pos);
    } else {
        list[pos] = new.to_string();
    }
}

/// Push a value if absent; returns whether the list changed
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Remove every occurrence of a value; returns whether the list changed
pub(crate) fn remove_value(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}
