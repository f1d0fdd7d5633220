//! Permission graph module
//!
//! Groups, users and the default-group fallback, plus the persistence
//! collaborator interface.
//!
//! ## Example Graph File
//!
//! ```json
//! {
//!   "defaultGroup": "default",
//!   "groups": {
//!     "default": { "permissions": ["chat.send"], "prefix": "[Member] " },
//!     "mod": { "permissions": ["mod.*", "-mod.ban"], "parents": ["default"], "priority": 75 }
//!   },
//!   "users": {
//!     "6f1c...": { "username": "Steve", "groups": ["mod"], "permissions": ["mod.ban"] }
//!   }
//! }
//! ```

pub mod store;
pub mod types;

pub use store::{GraphStore, JsonFileStore, MemoryStore};
pub use types::{DEFAULT_GROUP_ID, Group, PermissionGraph, User};
