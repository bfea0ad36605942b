//! DuckDB repositories
//!
//! Plain functions over a borrowed `Connection`; callers decide which
//! connection (writer, pooled reader, archive) and which transaction.

pub mod session;
pub mod span;
pub mod stats;
