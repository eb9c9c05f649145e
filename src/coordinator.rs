//! # Partition Claim Coordinator
//!
//! Claims whole partitions for the current worker and resolves each claim
//! into the ordered list of file-level work items belonging to it.
//!
//! Upstream storage offers no cross-file ordering guarantee, so storage
//! listing order is meaningless. Partition files are produced with a
//! deterministic `<prefix>_<sequence>.<ext>` naming convention; the
//! coordinator reconstructs the sequence `0, 1, 2, ...` client-side up to a
//! configured maximum, skipping sequence numbers that are missing rather
//! than failing.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{Operation, VersionedWorkItem};
use crate::queue::WorkQueue;
use crate::store::WorkItemFilter;

/// A claimed partition with its file items in ingestion order.
#[derive(Debug, Clone)]
pub struct ClaimedPartition {
    pub claim: VersionedWorkItem,
    pub partition_id: String,
    /// File-level work items, ordered by embedded sequence number
    pub files: Vec<VersionedWorkItem>,
}

/// Claims partitions and orders their file work items.
pub struct PartitionCoordinator {
    queue: Arc<WorkQueue>,
    max_files_per_partition: usize,
}

impl PartitionCoordinator {
    pub fn new(queue: Arc<WorkQueue>, max_files_per_partition: usize) -> Self {
        Self {
            queue,
            max_files_per_partition,
        }
    }

    /// Claim up to `max` partitions and resolve their ordered file lists.
    #[instrument(skip(self))]
    pub async fn claim_partitions(&self, max: usize) -> Result<Vec<ClaimedPartition>> {
        let filter = WorkItemFilter::open().with_operation(Operation::PartitionedWrite);
        let claims = self.queue.claim_many(&filter, max).await?;

        let mut partitions = Vec::with_capacity(claims.len());
        for claim in claims {
            // Partition items carry their own location as partition id.
            let partition_id = claim
                .item
                .partition_id
                .clone()
                .unwrap_or_else(|| claim.item.location.clone());
            let files = self.ordered_partition_files(&partition_id).await?;
            info!(
                partition_id = %partition_id,
                files = files.len(),
                "claimed partition"
            );
            partitions.push(ClaimedPartition {
                claim,
                partition_id,
                files,
            });
        }
        Ok(partitions)
    }

    /// Fetch one partition's open file items and order them by the sequence
    /// number embedded in their names.
    pub async fn ordered_partition_files(
        &self,
        partition_id: &str,
    ) -> Result<Vec<VersionedWorkItem>> {
        let found = self.queue.partition_file_items(partition_id).await?;
        Ok(order_by_sequence(found, self.max_files_per_partition))
    }
}

/// Reconstruct `<prefix>_<seq>.<ext>` sequence order from an arbitrarily
/// ordered listing. Missing sequence numbers are skipped. Items whose names
/// do not follow the convention are returned in discovery order.
fn order_by_sequence(items: Vec<VersionedWorkItem>, max_seq: usize) -> Vec<VersionedWorkItem> {
    let Some(first) = items.first() else {
        return items;
    };

    let name = first.item.name.as_str();
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], Some(&name[dot + 1..])),
        None => (name, None),
    };
    let Some(prefix_end) = stem.rfind('_') else {
        warn!(name, "partition file names lack a sequence suffix, keeping discovery order");
        return items;
    };
    let prefix = &stem[..prefix_end];

    let mut ordered = Vec::with_capacity(items.len());
    for seq in 0..=max_seq {
        let expected = match ext {
            Some(ext) => format!("{prefix}_{seq}.{ext}"),
            None => format!("{prefix}_{seq}"),
        };
        if let Some(found) = items.iter().find(|candidate| candidate.item.name == expected) {
            ordered.push(found.clone());
        }
    }

    if ordered.len() < items.len() {
        warn!(
            matched = ordered.len(),
            discovered = items.len(),
            "some partition files did not match the expected naming sequence"
        );
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StoreType, VersionToken, WorkItem};

    fn file(name: &str) -> VersionedWorkItem {
        VersionedWorkItem {
            item: WorkItem::new(
                format!("/partitions/p1/{name}"),
                StoreType::Local,
                Operation::PartitionFileWrite,
            )
            .with_name(name)
            .with_partition("p1"),
            version: VersionToken("1".into()),
        }
    }

    fn names(items: &[VersionedWorkItem]) -> Vec<&str> {
        items.iter().map(|i| i.item.name.as_str()).collect()
    }

    #[test]
    fn arbitrary_listing_order_is_rebuilt_into_sequence_order() {
        let shuffled = vec![
            file("batch_3.json"),
            file("batch_0.json"),
            file("batch_4.json"),
            file("batch_1.json"),
            file("batch_2.json"),
        ];
        let ordered = order_by_sequence(shuffled, 10);
        assert_eq!(
            names(&ordered),
            vec![
                "batch_0.json",
                "batch_1.json",
                "batch_2.json",
                "batch_3.json",
                "batch_4.json"
            ]
        );
    }

    #[test]
    fn missing_sequence_numbers_are_skipped() {
        let ordered = order_by_sequence(vec![file("batch_2.json"), file("batch_0.json")], 10);
        assert_eq!(names(&ordered), vec!["batch_0.json", "batch_2.json"]);
    }

    #[test]
    fn sequence_probing_stops_at_the_configured_maximum() {
        let ordered = order_by_sequence(vec![file("batch_0.json"), file("batch_7.json")], 5);
        assert_eq!(names(&ordered), vec!["batch_0.json"]);
    }

    #[test]
    fn names_without_the_convention_keep_discovery_order() {
        let ordered = order_by_sequence(vec![file("readme.txt"), file("notes.txt")], 10);
        assert_eq!(names(&ordered), vec!["readme.txt", "notes.txt"]);
    }

    #[test]
    fn empty_partitions_stay_empty() {
        assert!(order_by_sequence(vec![], 10).is_empty());
    }

    #[test]
    fn extensionless_sequences_are_ordered_too() {
        let ordered = order_by_sequence(vec![file("chunk_1"), file("chunk_0")], 5);
        assert_eq!(names(&ordered), vec!["chunk_0", "chunk_1"]);
    }
}
