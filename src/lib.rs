//! # jsonstore-import
//!
//! Distributed bulk importer: many independent worker processes
//! cooperatively drain a shared backlog of import jobs into a target store,
//! with no central scheduler.
//!
//! ## Architecture
//!
//! Coordination runs over a shared work-item collection with conditional
//! writes: workers claim items optimistically, and the store's version
//! tokens — not any in-process lock — guarantee at most one claim holder per
//! item. Claimed partitions stream through a two-deep read-ahead pipeline so
//! the bulk-write path never waits on file I/O.
//!
//! ## Module Organization
//!
//! - [`models`] - WorkItem records and import outcomes
//! - [`store`] - conditional-write façade over the work-item collection
//! - [`queue`] - enqueue and optimistic claim protocol
//! - [`coordinator`] - partition claiming and file-sequence ordering
//! - [`reader`] - background prefetching file reader
//! - [`pipeline`] - partition ingestion with read-ahead
//! - [`sink`] - bulk-write sink boundary
//! - [`source`] - storage backends behind a capability interface
//! - [`executor`] - top-level operations wired for the CLI
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Delivery Semantics
//!
//! At-least-zero, at-most-once per claim: there is no exactly-once delivery
//! and no ordering across partitions — only within one partition's file
//! sequence. An item claimed by a crashed worker stays in progress until
//! manually reclaimed; the protocol has no lease expiry.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod sink;
pub mod source;
pub mod store;

pub use config::{ImportConfig, StoreBackend};
pub use coordinator::{ClaimedPartition, PartitionCoordinator};
pub use error::{ImportError, Result};
pub use executor::ImportExecutor;
pub use models::{ImportOutcome, Operation, StoreType, VersionToken, VersionedWorkItem, WorkItem};
pub use pipeline::{PartitionPipeline, PipelineConfig};
pub use queue::{QueueConfig, WorkQueue};
pub use reader::{ReaderConfig, StreamingReader};
pub use sink::{BulkSink, SharedSink, SinkError, SinkProvider};
pub use source::{RecordTransform, SourceStore};
pub use store::{
    InsertResult, MemoryStore, PostgresStore, UpdateResult, WorkItemFilter, WorkItemStore,
};
