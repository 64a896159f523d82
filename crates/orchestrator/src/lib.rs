//! The Switchyard query pipeline.
//!
//! ```text
//! QueryRequest
//!      │
//!      ▼
//! ┌──────────┐   scores providers (keywords, capabilities, memory, model)
//! │  Router  │
//! └────┬─────┘
//!      ▼
//! ┌──────────┐   runs the selection in order under a deadline or budget
//! │ Executor │ ──► MemoryStore + registry execution log
//! └────┬─────┘
//!      ▼
//! ┌─────────────┐
//! │ Synthesizer │   one answer, sections in execution order
//! └─────┬───────┘
//!       ▼
//! QueryResponse
//! ```

pub mod executor;
pub mod orchestrator;
pub mod router;
pub mod synthesizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use executor::Executor;
pub use orchestrator::{Orchestrator, QueryRequest, QueryResponse, ResponseError};
pub use router::Router;
pub use synthesizer::{NO_ANSWER, Synthesizer};
