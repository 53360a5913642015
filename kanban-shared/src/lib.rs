//! # Kanban Shared Library
//!
//! Domain types, storage and business logic used by the Kanban API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and API read models
//! - `auth`: Passwords, bearer tokens and board-ownership checks
//! - `kanban`: Board rules and the board/column/card service
//! - `store`: Storage abstraction with in-memory and PostgreSQL backends
//! - `db`: Connection pool and migrations
//! - `error`: Domain error type

pub mod auth;
pub mod db;
pub mod error;
pub mod kanban;
pub mod models;
pub mod store;

/// Current version of the Kanban shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
