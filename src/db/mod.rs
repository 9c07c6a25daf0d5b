//! Storage backends.
//!
//! - **Vector store**: chunk embeddings for semantic search
//! - **Graph store**: entities and typed relations for traversal
//! - **History**: append-only thought-path records, in memory or in a local
//!   SQLite file through libsql
//!
//! The vector and graph stores are written by the indexing pipeline and only
//! read while research runs are in flight.

#![allow(missing_docs)]

pub mod graphstore;
pub mod history;
pub mod sqlite;
pub mod vectorstore;

pub use graphstore::{GraphCandidate, GraphStore, InMemoryGraphStore};
pub use history::{InMemoryThoughtPathStore, ThoughtPathStore};
pub use sqlite::SqliteThoughtPathStore;
pub use vectorstore::{InMemoryVectorStore, VectorCandidate, VectorStore};
