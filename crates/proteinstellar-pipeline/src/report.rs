//! Per-item results and the batch report handed to reporting collaborators.

use proteinstellar_common::{ErrorKind, Fingerprint};
use proteinstellar_engine::JobDiagnostics;
use proteinstellar_metrics::MetricSet;
use proteinstellar_structure::StructureRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything produced for one successfully analyzed sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub id: String,
    pub sequence: String,
    pub fingerprint: Fingerprint,
    pub structure: StructureRecord,
    pub metrics: MetricSet,
    pub diagnostics: JobDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Present when the failure happened after a job ran
    pub diagnostics: Option<JobDiagnostics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded(Box<ResultBundle>),
    Failed { id: String, sequence: String, failure: ItemFailure },
}

impl ItemOutcome {
    pub fn id(&self) -> &str {
        match self {
            ItemOutcome::Succeeded(bundle) => &bundle.id,
            ItemOutcome::Failed { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded(_))
    }

    pub fn bundle(&self) -> Option<&ResultBundle> {
        match self {
            ItemOutcome::Succeeded(bundle) => Some(bundle.as_ref()),
            ItemOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            ItemOutcome::Succeeded(_) => None,
            ItemOutcome::Failed { failure, .. } => Some(failure),
        }
    }
}

/// One line of [`BatchReport::failure_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Position in the input batch
    pub index: usize,
    pub id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Exactly one outcome per input, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub engine: String,
    pub items: Vec<ItemOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ResultBundle> + '_ {
        self.items.iter().filter_map(ItemOutcome::bundle)
    }

    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.items.len() - self.success_count()
    }

    /// Which inputs failed and why.
    pub fn failure_report(&self) -> Vec<FailureEntry> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                item.failure().map(|f| FailureEntry {
                    index,
                    id: item.id().to_string(),
                    kind: f.kind,
                    message: f.message.clone(),
                })
            })
            .collect()
    }
}
