//! Permission token matching
//!
//! A token is a literal node (`server.fly`), a negation (`-server.fly`), the
//! bare wildcard `*`, a namespace wildcard (`server.*`) or a glob with an
//! embedded `*` (`server.*.admin`). Globs are compiled to anchored regexes
//! once and memoised.

use dashmap::DashMap;
use regex::Regex;
use std::fmt;
use tracing::{trace, warn};

/// Full wildcard token
pub const WILDCARD: &str = "*";

/// Prefix marking a negated token
pub const NEGATION_PREFIX: char = '-';

/// Definitive outcome of matching a node against a token list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub const fn from_negation(negated: bool) -> Self {
        if negated { Verdict::Deny } else { Verdict::Allow }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of a token once its negation is stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// Plain node, matched only by the exact checks
    Literal,
    /// `prefix.*`
    Namespace(&'a str),
    /// Any other token containing `*`
    Glob,
}

/// A parsed view over a raw token string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionToken<'a> {
    pub negated: bool,
    pub node: &'a str,
}

impl<'a> PermissionToken<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.strip_prefix(NEGATION_PREFIX) {
            Some(node) => Self {
                negated: true,
                node,
            },
            None => Self {
                negated: false,
                node: raw,
            },
        }
    }

    pub fn kind(&self) -> TokenKind<'a> {
        if let Some(prefix) = self.node.strip_suffix(".*") {
            TokenKind::Namespace(prefix)
        } else if self.node.contains('*') {
            TokenKind::Glob
        } else {
            TokenKind::Literal
        }
    }

    pub fn is_pattern(&self) -> bool {
        !matches!(self.kind(), TokenKind::Literal)
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_negation(self.negated)
    }
}

/// Token list matcher with a memo of compiled globs
#[derive(Debug, Default)]
pub struct PatternMatcher {
    globs: DashMap<String, Option<Regex>>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a node against a token list
    ///
    /// Precedence is fixed regardless of list order: exact negation, exact
    /// grant, bare `*`, then the first matching pattern token in list order.
    pub fn match_list(&self, tokens: &[String], node: &str) -> Option<Verdict> {
        if tokens.is_empty() || node.is_empty() {
            return None;
        }

        let mut exact_grant = false;
        let mut wildcard = false;
        for token in tokens {
            if let Some(negated) = token.strip_prefix(NEGATION_PREFIX)
                && negated == node
            {
                trace!(token = %token, "Exact negation");
                return Some(Verdict::Deny);
            }
            exact_grant |= token == node;
            wildcard |= token == WILDCARD;
        }
        if exact_grant || wildcard {
            return Some(Verdict::Allow);
        }

        tokens
            .iter()
            .map(|raw| PermissionToken::parse(raw))
            .find(|token| token.is_pattern() && self.pattern_matches(token, node))
            .map(|token| {
                trace!(pattern = token.node, negated = token.negated, "Pattern match");
                token.verdict()
            })
    }

    fn pattern_matches(&self, token: &PermissionToken<'_>, node: &str) -> bool {
        if let TokenKind::Namespace(prefix) = token.kind()
            && namespace_matches(prefix, node)
        {
            return true;
        }
        self.glob_matches(token.node, node)
    }

    fn glob_matches(&self, pattern: &str, node: &str) -> bool {
        if let Some(compiled) = self.globs.get(pattern) {
            return compiled.value().as_ref().is_some_and(|re| re.is_match(node));
        }

        let compiled = compile_glob(pattern);
        let matched = compiled.as_ref().is_some_and(|re| re.is_match(node));
        self.globs.insert(pattern.to_string(), compiled);
        matched
    }

    /// Number of compiled globs held in the memo
    pub fn compiled_len(&self) -> usize {
        self.globs.len()
    }

    /// Forget every compiled glob
    pub fn clear(&self) {
        self.globs.clear();
    }
}

/// `prefix.*` covers `prefix` itself and anything below `prefix.`
pub fn namespace_matches(prefix: &str, node: &str) -> bool {
    node == prefix
        || node
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Compile a glob where `*` matches any substring and everything else is literal
fn compile_glob(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match Regex::new(&format!("^{body}$")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "Unusable wildcard token, ignoring");
            None
        }
    }
}
