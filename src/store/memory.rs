//! In-memory [`WorkItemStore`] backed by a concurrent map.
//!
//! Used for single-process runs and tests. Version tokens are per-record
//! counters; the compare-and-swap in [`conditional_update`] gives the same
//! mutual-exclusion guarantee as the shared collection's precondition
//! checks. Iteration order of the underlying map is arbitrary, which matches
//! the no-ordering contract of the store query.
//!
//! [`conditional_update`]: WorkItemStore::conditional_update

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::{VersionToken, VersionedWorkItem, WorkItem};
use crate::store::{InsertResult, UpdateResult, WorkItemFilter, WorkItemStore};

#[derive(Debug, Clone)]
struct StoredRecord {
    item: WorkItem,
    version: u64,
}

/// Concurrent in-memory work-item collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, StoredRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one record regardless of its lifecycle state. Test and
    /// diagnostic helper; the queue protocol only sees open items.
    pub fn get(&self, id: &str) -> Option<VersionedWorkItem> {
        self.records.get(id).map(|entry| VersionedWorkItem {
            item: entry.item.clone(),
            version: VersionToken(entry.version.to_string()),
        })
    }

    /// Copy out every record regardless of lifecycle state. Test and
    /// diagnostic helper.
    pub fn snapshot(&self) -> Vec<VersionedWorkItem> {
        self.records
            .iter()
            .map(|entry| VersionedWorkItem {
                item: entry.item.clone(),
                version: VersionToken(entry.version.to_string()),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn matches(filter: &WorkItemFilter, item: &WorkItem) -> bool {
    if item.is_in_progress || item.is_complete {
        return false;
    }
    if let Some(operation) = filter.operation {
        if item.operation != operation {
            return false;
        }
    }
    if let Some(partition_id) = &filter.partition_id {
        if item.partition_id.as_deref() != Some(partition_id.as_str()) {
            return false;
        }
    }
    true
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn query(&self, filter: &WorkItemFilter) -> Result<Vec<VersionedWorkItem>> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut found = Vec::new();
        for entry in self.records.iter() {
            if found.len() >= limit {
                break;
            }
            if matches(filter, &entry.item) {
                found.push(VersionedWorkItem {
                    item: entry.item.clone(),
                    version: VersionToken(entry.version.to_string()),
                });
            }
        }
        Ok(found)
    }

    async fn conditional_update(
        &self,
        item: &WorkItem,
        expected: &VersionToken,
    ) -> Result<UpdateResult> {
        let Some(mut entry) = self.records.get_mut(&item.id) else {
            return Ok(UpdateResult::VersionConflict);
        };
        if entry.version.to_string() != expected.0 {
            return Ok(UpdateResult::VersionConflict);
        }
        entry.version += 1;
        entry.item = item.clone();
        Ok(UpdateResult::Applied(VersionedWorkItem {
            item: entry.item.clone(),
            version: VersionToken(entry.version.to_string()),
        }))
    }

    async fn insert(&self, item: &WorkItem) -> Result<InsertResult> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(item.id.clone()) {
            Entry::Occupied(_) => Ok(InsertResult::DuplicateKey),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredRecord {
                    item: item.clone(),
                    version: 1,
                });
                Ok(InsertResult::Inserted(VersionedWorkItem {
                    item: item.clone(),
                    version: VersionToken("1".to_string()),
                }))
            }
        }
    }
}
