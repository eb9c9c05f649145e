//! # Import Outcome
//!
//! Per-batch summary returned by the bulk-write sink, and the aggregator that
//! folds batch outcomes into per-file and per-partition summaries.
//!
//! Aggregation is field-wise summation of the numeric fields plus
//! concatenation of the error lists, so it is associative, and commutative
//! over the numeric fields.

use serde::{Deserialize, Serialize};

/// Summary of one bulk submission (or an aggregate of several).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// Records handed to the sink
    pub docs_received: u64,
    /// Records the sink actually persisted
    pub docs_imported: u64,
    /// Wall time the sink reported for the submission, in seconds
    pub elapsed_seconds: u64,
    /// Cost metric reported by the sink (request units, bytes, ...)
    pub consumed_units: f64,
    /// Per-record error messages, possibly empty
    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl ImportOutcome {
    /// A batch is degraded when the sink persisted fewer records than it
    /// received. The pipeline reacts by rebuilding the sink handle; it never
    /// rolls back the prefix that did import.
    pub fn is_error(&self) -> bool {
        self.docs_received > self.docs_imported
    }

    /// Outcome for a submission that failed wholesale before any record was
    /// persisted.
    pub fn failed(docs_received: u64, message: impl Into<String>) -> Self {
        Self {
            docs_received,
            error_messages: vec![message.into()],
            ..Self::default()
        }
    }

    /// Fold a list of outcomes into one by field-wise summation.
    pub fn aggregate(outcomes: &[ImportOutcome]) -> ImportOutcome {
        let mut aggregated = ImportOutcome::default();
        for outcome in outcomes {
            aggregated.docs_received += outcome.docs_received;
            aggregated.docs_imported += outcome.docs_imported;
            aggregated.elapsed_seconds += outcome.elapsed_seconds;
            aggregated.consumed_units += outcome.consumed_units;
            aggregated
                .error_messages
                .extend(outcome.error_messages.iter().cloned());
        }
        aggregated
    }
}
