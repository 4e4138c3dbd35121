//! # docsync
//!
//! Resumable bulk copy and synchronization between two instances of a
//! hierarchical document store (collections containing documents,
//! documents optionally containing nested sub-collections).
//!
//! The crate provides:
//!
//! - **Checkpointed transfers** that survive process restarts via a
//!   schema-versioned JSON state file
//! - **Bounded-concurrency** collection transfers
//! - **Rate limiting** of destination writes with a per-second quota
//! - **Retry with exponential backoff** around every batch commit
//! - **Recursive traversal** of sub-collection trees with excludes,
//!   renames, id remapping, transforms, and conflict detection
//!
//! ## Example
//!
//! ```rust,no_run
//! use docsync::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> docsync::Result<()> {
//!     let config = Config::load("docsync.yaml")?;
//!     let outcome = Orchestrator::new(config).await?.run().await;
//!     println!("transferred {} documents", outcome.stats.documents_transferred);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
mod fsutil;
pub mod orchestrator;
pub mod pattern;
pub mod rate_limit;
pub mod retry;
pub mod stats;
pub mod store;
pub mod transfer;
pub mod transform;
pub mod verify;

// Re-exports for convenient access
pub use checkpoint::{CheckpointState, CompletedDocsCache, SaverThresholds, StateSaver};
pub use config::{Config, StoreEndpoint, TransferConfig, MAX_BATCH_SIZE};
pub use error::{Result, SyncError};
pub use executor::{run_bounded, ExecutorOutput};
pub use orchestrator::{Orchestrator, TransferOutcome};
pub use pattern::ExcludePatterns;
pub use rate_limit::WriteRateLimiter;
pub use retry::RetryPolicy;
pub use stats::{ConflictInfo, Stats};
pub use store::{
    Document, DocumentData, DocumentQuery, DocumentStore, FieldFilter, FilterOp, JsonFileStore,
    MemoryStore, WriteBatch, WriteOp,
};
pub use transfer::{TransferContext, TransferEngine};
pub use transform::{DocumentTransform, FnTransform, TransformAction, TransformContext};
pub use verify::{CollectionVerify, VerifyReport};
