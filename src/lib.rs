//! Hierarchical permission resolution
//!
//! Decides whether a user holds a permission node by combining direct user
//! grants, group membership, group inheritance chains, wildcard patterns and
//! explicit negations, and caches the result for repeated lookups.
//!
//! ## Features
//!
//! - **Group inheritance** through parent chains, tolerant of cycles
//! - **Wildcards**: `*`, namespace tokens like `server.*`, embedded globs like `server.*.admin`
//! - **Negations**: `-server.fly` denies even when a wildcard grants
//! - **Priority** based effective group for display prefix and suffix
//! - **Concurrent cache** with per-user and full invalidation on every mutation
//!
//! ## Resolution Model
//!
//! ```text
//! user permissions → user groups (+ parents) → default group (+ parents) → deny
//! ```
//!
//! ## Example
//!
//! ```
//! use permweave::graph::{Group, PermissionGraph, User};
//! use permweave::PermissionService;
//!
//! let graph = PermissionGraph::default()
//!     .with_group("mod", Group::with_priority(75).permissions(["*", "-server.stop"]))
//!     .with_user("steve", User::in_groups(["mod"]));
//! let service = PermissionService::in_memory(graph);
//!
//! assert!(service.has_permission("steve", "server.kick"));
//! assert!(!service.has_permission("steve", "server.stop"));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod resolver;
pub mod service;

// Re-export main types
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use service::PermissionService;
