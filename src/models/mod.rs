//! # Shared Data Model
//!
//! Persisted records and result types shared across the work queue, the
//! partition coordinator, and the ingestion pipeline.

pub mod import_outcome;
pub mod work_item;

pub use import_outcome::ImportOutcome;
pub use work_item::{Operation, StoreType, VersionToken, VersionedWorkItem, WorkItem};
