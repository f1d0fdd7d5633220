//! Permission resolver
//!
//! Resolves a node for a user with the following precedence (highest to
//! lowest):
//! 1. The user's direct permissions
//! 2. Each of the user's groups in listed order, through its parent chain
//! 3. The default group's chain
//!
//! Within a chain a group's own permissions beat its parents', and parents
//! are visited depth-first in listed order. A visited set shared by the whole
//! lookup breaks cycles in the parent graph.

use crate::graph::{Group, PermissionGraph};
use crate::resolver::tokens::{PatternMatcher, Verdict};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Where a decision came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    /// Empty user id or node
    InvalidInput,
    /// The user's direct permissions
    User,
    /// A group chain rooted at one of the user's groups
    Group { root: String, matched: String },
    /// The default group's chain
    DefaultGroup { matched: String },
    /// No token matched anywhere
    NoMatch,
}

/// Full outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub allowed: bool,
    pub source: DecisionSource,
}

impl Resolution {
    fn from_verdict(verdict: Verdict, source: DecisionSource) -> Self {
        Self {
            allowed: verdict.is_allowed(),
            source,
        }
    }

    fn denied(source: DecisionSource) -> Self {
        Self {
            allowed: false,
            source,
        }
    }
}

/// Stateless resolver over a borrowed graph
pub struct PermissionResolver<'a> {
    graph: &'a PermissionGraph,
    matcher: &'a PatternMatcher,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(graph: &'a PermissionGraph, matcher: &'a PatternMatcher) -> Self {
        Self { graph, matcher }
    }

    /// Decide whether `user_id` holds `node`
    pub fn allowed(&self, user_id: &str, node: &str) -> bool {
        self.explain(user_id, node).allowed
    }

    /// Decide and report which rule decided
    pub fn explain(&self, user_id: &str, node: &str) -> Resolution {
        if user_id.is_empty() || node.is_empty() {
            return Resolution::denied(DecisionSource::InvalidInput);
        }

        let mut visited: HashSet<&'a str> = HashSet::new();

        if let Some(user) = self.graph.user(user_id) {
            if let Some(verdict) = self.matcher.match_list(&user.permissions, node) {
                debug!(user = user_id, node, %verdict, "Decided by direct permission");
                return Resolution::from_verdict(verdict, DecisionSource::User);
            }

            for root in &user.groups {
                if let Some((verdict, matched)) = self.resolve_chain(root, node, &mut visited) {
                    debug!(user = user_id, node, group = matched, %verdict, "Decided by group chain");
                    return Resolution::from_verdict(
                        verdict,
                        DecisionSource::Group {
                            root: root.clone(),
                            matched: matched.to_string(),
                        },
                    );
                }
            }
        }

        let default_group = self.graph.default_group_id();
        if let Some((verdict, matched)) = self.resolve_chain(default_group, node, &mut visited) {
            debug!(user = user_id, node, group = matched, %verdict, "Decided by default group");
            return Resolution::from_verdict(
                verdict,
                DecisionSource::DefaultGroup {
                    matched: matched.to_string(),
                },
            );
        }

        debug!(user = user_id, node, "No matching permission");
        Resolution::denied(DecisionSource::NoMatch)
    }

    /// Walk one group chain; returns the verdict and the group that held the token
    fn resolve_chain(
        &self,
        root: &'a str,
        node: &str,
        visited: &mut HashSet<&'a str>,
    ) -> Option<(Verdict, &'a str)> {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                trace!(group = id, "Already visited");
                continue;
            }
            let Some(group) = self.graph.group(id) else {
                trace!(group = id, "Unknown group");
                continue;
            };
            if let Some(verdict) = self.matcher.match_list(&group.permissions, node) {
                return Some((verdict, id));
            }
            // Reversed so the first listed parent is explored first
            stack.extend(group.parents.iter().rev().map(String::as_str));
        }

        None
    }

    /// Highest-priority group among the user's groups, or the default group
    ///
    /// Unknown group ids are skipped; on equal priority the group listed
    /// first wins. `None` only when even the default group is undefined.
    pub fn effective_group(&self, user_id: &str) -> Option<&'a str> {
        let mut best: Option<(&'a str, i32)> = None;

        if let Some(user) = self.graph.user(user_id) {
            for id in &user.groups {
                let Some(group) = self.graph.group(id) else {
                    continue;
                };
                if best.is_none_or(|(_, priority)| group.priority > priority) {
                    best = Some((id.as_str(), group.priority));
                }
            }
        }

        best.map(|(id, _)| id).or_else(|| {
            let default_group = self.graph.default_group_id();
            self.graph
                .has_group(default_group)
                .then_some(default_group)
        })
    }

    pub fn prefix(&self, user_id: &str) -> &'a str {
        self.display_attribute(user_id, |group| group.prefix.as_str())
    }

    pub fn suffix(&self, user_id: &str) -> &'a str {
        self.display_attribute(user_id, |group| group.suffix.as_str())
    }

    /// Effective group's attribute if set, else the default group's, else empty
    fn display_attribute<F>(&self, user_id: &str, attribute: F) -> &'a str
    where
        F: Fn(&'a Group) -> &'a str,
    {
        let effective = self
            .effective_group(user_id)
            .and_then(|id| self.graph.group(id))
            .map(&attribute)
            .filter(|value| !value.is_empty());

        effective
            .or_else(|| {
                self.graph
                    .group(self.graph.default_group_id())
                    .map(&attribute)
            })
            .unwrap_or("")
    }

    /// Every defined group reachable from the user's groups, depth-first, deduplicated
    pub fn inherited_groups(&self, user_id: &str) -> Vec<&'a str> {
        let roots: Vec<&'a str> = match self.graph.user(user_id) {
            Some(user) if !user.groups.is_empty() => {
                user.groups.iter().map(String::as_str).collect()
            }
            _ => vec![self.graph.default_group_id()],
        };

        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        for root in roots {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                let Some(group) = self.graph.group(id) else {
                    continue;
                };
                ordered.push(id);
                stack.extend(group.parents.iter().rev().map(String::as_str));
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::User;

    fn check(graph: &PermissionGraph, user: &str, node: &str) -> bool {
        let matcher = PatternMatcher::new();
        PermissionResolver::new(graph, &matcher).allowed(user, node)
    }

    #[test]
    fn test_invalid_input() {
        let graph = PermissionGraph::default()
            .with_group("default", Group::default().permissions(["*"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(
            resolver.explain("", "a.b").source,
            DecisionSource::InvalidInput
        );
        assert!(!resolver.allowed("u", ""));
    }

    #[test]
    fn test_own_permissions_beat_parents() {
        let graph = PermissionGraph::default()
            .with_group("base", Group::default().permissions(["build"]))
            .with_group(
                "guest",
                Group::default().permissions(["-build"]).parents(["base"]),
            )
            .with_user("u", User::in_groups(["guest"]));

        assert!(!check(&graph, "u", "build"));
    }

    #[test]
    fn test_first_parent_in_list_order_wins() {
        let graph = PermissionGraph::default()
            .with_group("allow", Group::default().permissions(["fly"]))
            .with_group("deny", Group::default().permissions(["-fly"]))
            .with_group("a", Group::default().parents(["allow", "deny"]))
            .with_group("b", Group::default().parents(["deny", "allow"]))
            .with_user("ua", User::in_groups(["a"]))
            .with_user("ub", User::in_groups(["b"]));

        assert!(check(&graph, "ua", "fly"));
        assert!(!check(&graph, "ub", "fly"));
    }

    #[test]
    fn test_depth_first_before_next_parent() {
        // a -> [b, c]; b -> d grants, c denies: d is reached through b first
        let graph = PermissionGraph::default()
            .with_group("d", Group::default().permissions(["x"]))
            .with_group("b", Group::default().parents(["d"]))
            .with_group("c", Group::default().permissions(["-x"]))
            .with_group("a", Group::default().parents(["b", "c"]))
            .with_user("u", User::in_groups(["a"]));

        assert!(check(&graph, "u", "x"));
    }

    #[test]
    fn test_explain_reports_matched_group() {
        let graph = PermissionGraph::default()
            .with_group("base", Group::default().permissions(["chat.*"]))
            .with_group("vip", Group::default().parents(["base"]))
            .with_user("u", User::in_groups(["vip"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(
            resolver.explain("u", "chat.send"),
            Resolution {
                allowed: true,
                source: DecisionSource::Group {
                    root: "vip".into(),
                    matched: "base".into(),
                },
            }
        );
    }

    #[test]
    fn test_user_without_groups_uses_default() {
        let graph = PermissionGraph::default()
            .with_group("default", Group::default().permissions(["chat.send"]))
            .with_user("u", User::default());

        assert!(check(&graph, "u", "chat.send"));
    }

    #[test]
    fn test_unknown_groups_are_skipped() {
        let graph = PermissionGraph::default()
            .with_group("default", Group::default().permissions(["chat.send"]))
            .with_user("u", User::in_groups(["ghost"]));

        assert!(check(&graph, "u", "chat.send"));
    }

    #[test]
    fn test_effective_group_tie_goes_to_first_listed() {
        let graph = PermissionGraph::default()
            .with_group("b", Group::with_priority(10))
            .with_group("a", Group::with_priority(10))
            .with_user("u", User::in_groups(["b", "a"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(resolver.effective_group("u"), Some("b"));
    }

    #[test]
    fn test_effective_group_falls_back_to_default() {
        let graph = PermissionGraph::default().with_user("u", User::in_groups(["ghost"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(resolver.effective_group("u"), Some("default"));
        assert_eq!(resolver.effective_group("nobody"), Some("default"));

        let empty = PermissionGraph::empty("default");
        let resolver = PermissionResolver::new(&empty, &matcher);
        assert_eq!(resolver.effective_group("nobody"), None);
    }

    #[test]
    fn test_prefix_falls_back_to_default_group() {
        let mut default_group = Group::default();
        default_group.prefix = "[Member] ".into();
        default_group.suffix = " *".into();
        let mut vip = Group::with_priority(50);
        vip.prefix = "[VIP] ".into();

        let graph = PermissionGraph::default()
            .with_group("default", default_group)
            .with_group("vip", vip)
            .with_user("u", User::in_groups(["vip"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(resolver.prefix("u"), "[VIP] ");
        assert_eq!(resolver.suffix("u"), " *");
        assert_eq!(resolver.prefix("stranger"), "[Member] ");
    }

    #[test]
    fn test_inherited_groups_order() {
        let graph = PermissionGraph::default()
            .with_group("vip", Group::default().parents(["default"]))
            .with_group("mod", Group::default().parents(["vip", "ghost"]))
            .with_user("u", User::in_groups(["mod", "vip"]));
        let matcher = PatternMatcher::new();
        let resolver = PermissionResolver::new(&graph, &matcher);

        assert_eq!(resolver.inherited_groups("u"), vec!["mod", "vip", "default"]);
        assert_eq!(resolver.inherited_groups("stranger"), vec!["default"]);
    }
}
