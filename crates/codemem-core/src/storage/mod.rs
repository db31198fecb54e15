//! Storage module.
//!
//! SQLite-backed relational store with:
//! - Typed DAO operations (no raw SQL outside this module)
//! - Single-writer / snapshot-reader connection pair
//! - Versioned migrations applied at open
//! - Tokenized LIKE keyword search over content, tags, paths, metadata

mod migrations;
mod sqlite;

pub use migrations::{MIGRATIONS, Migration, apply_migrations};
pub use sqlite::{ContextFilter, Database};
