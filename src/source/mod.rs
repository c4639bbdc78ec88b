//! Row sources shipped with the crate
//!
//! Domain code normally implements [`Index`](crate::elasticsearch::Index)
//! itself; the SQLite source covers the common "one table per index" case.

pub mod sqlite;

pub use sqlite::{ChangedFlagReset, SqliteIndex, TableSpec};
