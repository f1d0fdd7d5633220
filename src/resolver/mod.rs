//! Permission resolution module
//!
//! ## Resolution Model
//!
//! A lookup for `(user, node)` is decided by the first definitive match in
//! this order (highest to lowest):
//!
//! 1. **User permissions** - the user's own token list
//! 2. **User groups** - each listed group, then its parents depth-first
//! 3. **Default group** - the configured fallback group's chain
//!
//! No match anywhere means deny.
//!
//! Within one token list the precedence is fixed and independent of order:
//! - exact negation `-node`
//! - exact grant `node`
//! - bare wildcard `*`
//! - first matching pattern (`prefix.*` or embedded `*`) in list order
//!
//! ## Example
//!
//! ```json
//! "mod": { "permissions": ["*", "-server.stop", "mod.*", "-mod.ban.*"] }
//! ```
//!
//! Members of `mod` hold everything except `server.stop`. The bare `*` is
//! checked before the pattern scan, so `-mod.ban.*` never takes effect here.

pub mod cache;
pub mod engine;
pub mod tokens;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use engine::{DecisionSource, PermissionResolver, Resolution};
pub use tokens::{PatternMatcher, PermissionToken, TokenKind, Verdict};
