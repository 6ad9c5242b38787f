//! Compensation log for transaction bundles.
//!
//! The warehouse has no native multi-statement transactions, so a
//! transaction bundle records what it changed and undoes it when an entry
//! fails: resources created by the bundle are deleted, resources updated or
//! deleted by the bundle are re-written from the snapshot taken before the
//! first change.

use std::collections::HashSet;

use cdwfhir_core::FhirReference;
use cdwfhir_storage::MapperRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Lifecycle of a transaction's compensation log.
///
/// `Running -> Committed` when every entry succeeded,
/// `Running -> RollingBack -> RolledBack` when one failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    Running,
    Committed,
    RollingBack,
    RolledBack,
}

/// Pre-change copy of a resource the bundle updated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub target: FhirReference,
    pub resource: Value,
}

/// What a rollback managed to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Created resources that were deleted again.
    pub deleted: usize,
    /// Snapshots that were written back.
    pub restored: usize,
    /// Compensation steps that failed; the store may be partially changed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Records the changes made by one bundle so they can be undone.
#[derive(Debug)]
pub struct CompensationLog {
    tracking: bool,
    state: TransactionState,
    created: Vec<FhirReference>,
    restorable: Vec<Snapshot>,
    snapshotted: HashSet<FhirReference>,
}

impl CompensationLog {
    /// A log that records changes (transaction mode).
    pub fn new() -> Self {
        Self {
            tracking: true,
            state: TransactionState::Running,
            created: Vec::new(),
            restorable: Vec::new(),
            snapshotted: HashSet::new(),
        }
    }

    /// A log that records nothing (batch mode).
    pub fn disabled() -> Self {
        Self {
            tracking: false,
            ..Self::new()
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn created(&self) -> &[FhirReference] {
        &self.created
    }

    pub fn restorable(&self) -> &[Snapshot] {
        &self.restorable
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.restorable.is_empty()
    }

    /// Records a resource created by the bundle.
    pub fn record_created(&mut self, resource_type: &str, id: &str) {
        if !self.tracking || self.state != TransactionState::Running {
            return;
        }
        self.created.push(FhirReference::new(resource_type, id));
    }

    /// Records the pre-change content of a resource about to be updated or
    /// deleted. Only the first snapshot per resource is kept, and resources
    /// created by this bundle are never snapshotted (deleting them undoes
    /// every later change). Returns whether the snapshot was kept.
    pub fn record_restorable(&mut self, resource_type: &str, id: &str, resource: Value) -> bool {
        if !self.tracking || self.state != TransactionState::Running {
            return false;
        }
        let target = FhirReference::new(resource_type, id);
        if self.created.contains(&target) || !self.snapshotted.insert(target.clone()) {
            return false;
        }
        self.restorable.push(Snapshot { target, resource });
        true
    }

    pub fn can_commit(&self) -> bool {
        self.state == TransactionState::Running
    }

    pub fn can_rollback(&self) -> bool {
        self.state == TransactionState::Running
    }

    /// Forgets the recorded changes; they are now permanent.
    pub fn commit(&mut self) {
        if self.can_commit() {
            self.state = TransactionState::Committed;
            self.created.clear();
            self.restorable.clear();
            self.snapshotted.clear();
        }
    }

    /// Undoes the recorded changes, best effort.
    ///
    /// Created resources are deleted first, then snapshots are written back
    /// under their original ids, each list in the order it was recorded. A
    /// failing step is logged and reported but does not stop the others.
    pub async fn rollback(&mut self, registry: &MapperRegistry) -> RollbackReport {
        let mut report = RollbackReport::default();
        if !self.can_rollback() {
            return report;
        }
        self.state = TransactionState::RollingBack;
        info!(
            created = self.created.len(),
            restorable = self.restorable.len(),
            "Rolling back transaction"
        );

        for target in self.created.drain(..) {
            match registry.delete(&target.resource_type, &target.id).await {
                Ok(_) => {
                    debug!(target = %target, "Compensated create");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "Failed to delete created resource during rollback");
                    report
                        .failures
                        .push(format!("delete {target}: {e}"));
                }
            }
        }

        for snapshot in self.restorable.drain(..) {
            let target = &snapshot.target;
            match registry
                .write(&target.resource_type, &snapshot.resource, Some(&target.id))
                .await
            {
                Ok(_) => {
                    debug!(target = %target, "Restored snapshot");
                    report.restored += 1;
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "Failed to restore snapshot during rollback");
                    report
                        .failures
                        .push(format!("restore {target}: {e}"));
                }
            }
        }

        self.snapshotted.clear();
        self.state = TransactionState::RolledBack;
        report
    }
}

impl Default for CompensationLog {
    fn default() -> Self {
        Self::new()
    }
}
