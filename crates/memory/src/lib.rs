//! Memory tiers for Switchyard.
//!
//! [`MemoryStore`] is the only entry point the rest of the workspace uses;
//! the backends underneath are swappable through [`HistoryBackend`](switchyard_core::HistoryBackend).

pub mod embedder;
pub mod file_backend;
pub mod in_memory;
pub mod noop;
pub mod sessions;
pub mod short_term;
pub mod store;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use embedder::{HashingEmbedder, NoEmbedder};
pub use file_backend::FileHistory;
pub use in_memory::InMemoryHistory;
pub use noop::NoopHistory;
pub use sessions::{SessionInfo, SessionStore, SessionSummary};
pub use short_term::{ShortTermCache, ShortTermRecord};
pub use store::{HistorySearch, MemoryStore, PURGE_INTERVAL, PurgeReport};
pub use vector::{cosine_similarity, rank_by_similarity};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistory;
