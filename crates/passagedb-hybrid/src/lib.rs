//! passagedb-hybrid
//!
//! Fusion of dense and keyword rankings, and the retriever that runs both
//! searches concurrently for one query.

pub mod config;
pub mod error;
pub mod fusion;
mod retriever;
mod store;

pub use config::RetrievalConfig;
pub use error::{Result, RetrievalError};
pub use fusion::{fuse, FusionStrategy};
pub use retriever::{HybridRetriever, ReconciliationReport};
pub use store::{PassageRetriever, VECTOR_INDEX_NAME};
