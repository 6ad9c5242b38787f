//! Bundle processing errors.
//!
//! Two levels of failure exist:
//! - [`Fault`]: one entry could not be executed. In batch mode it becomes that
//!   entry's outcome; in transaction mode it halts execution and triggers
//!   compensation.
//! - [`BundleError`]: the bundle as a whole was rejected or rolled back.

use std::fmt;

use cdwfhir_storage::{ErrorCategory, StorageError};
use serde::Serialize;

use crate::compensation::RollbackReport;
use crate::entry::OutcomeStatus;

/// Category of an entry-level fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Malformed entry: bad request URL, missing resource, unusable verb.
    Validation,
    /// Target resource or temporary id does not exist.
    NotFound,
    /// No mapper serves the resource type.
    UnsupportedType,
    /// The store rejected or failed a read, write or delete.
    Store,
    /// A reference names a bundle entry that is missing or could not be executed.
    Reference,
    /// An entry's references lead back to itself.
    Cycle,
    /// Reference resolution nested deeper than allowed.
    DepthExceeded,
    /// The processing deadline passed.
    Timeout,
}

impl FaultKind {
    /// Per-entry outcome status reported for this kind of fault.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Validation | Self::Reference | Self::Cycle | Self::DepthExceeded => {
                OutcomeStatus::BadRequest
            }
            Self::NotFound => OutcomeStatus::NotFound,
            Self::UnsupportedType => OutcomeStatus::NotImplemented,
            Self::Store | Self::Timeout => OutcomeStatus::InternalError,
        }
    }

    /// OperationOutcome `issue.code` for this kind of fault.
    pub fn issue_code(&self) -> &'static str {
        match self {
            Self::Validation => "invalid",
            Self::NotFound => "not-found",
            Self::UnsupportedType => "not-supported",
            Self::Store => "exception",
            Self::Reference | Self::Cycle | Self::DepthExceeded => "processing",
            Self::Timeout => "timeout",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::UnsupportedType => "unsupported type",
            Self::Store => "store",
            Self::Reference => "reference",
            Self::Cycle => "reference cycle",
            Self::DepthExceeded => "reference depth exceeded",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one entry failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    pub fn unsupported_type(resource_type: &str) -> Self {
        Self::new(
            FaultKind::UnsupportedType,
            format!("resource type '{resource_type}' is not supported"),
        )
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Store, message)
    }

    pub fn cycle(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Cycle, message)
    }

    pub fn depth_exceeded(max_depth: usize) -> Self {
        Self::new(
            FaultKind::DepthExceeded,
            format!("reference resolution nested deeper than {max_depth} levels"),
        )
    }

    pub fn timeout() -> Self {
        Self::new(FaultKind::Timeout, "bundle processing deadline exceeded")
    }

    /// Same kind, message prefixed with `context`.
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }

    /// Fault of an entry whose reference `reference` failed with `self`.
    ///
    /// The entry reports a reference fault of its own and keeps the referenced
    /// entry's fault in the message only. Cycle, depth and deadline faults
    /// describe the whole chain and keep their kind.
    #[must_use]
    pub fn through_reference(self, reference: &str) -> Self {
        let context = format!("reference '{reference}' could not be resolved");
        match self.kind {
            FaultKind::Reference | FaultKind::Cycle | FaultKind::DepthExceeded | FaultKind::Timeout => {
                self.context(context)
            }
            _ => Self::new(FaultKind::Reference, format!("{context}: {self}")),
        }
    }

    /// Whether this fault halts a transaction and compensates it.
    ///
    /// Unsupported types never reached the store, so they are skipped instead.
    pub fn aborts_transaction(&self) -> bool {
        self.kind != FaultKind::UnsupportedType
    }

    /// Outcome status this fault is reported as.
    pub fn status(&self) -> OutcomeStatus {
        self.kind.status()
    }
}

impl From<StorageError> for Fault {
    fn from(err: StorageError) -> Self {
        match err.category() {
            ErrorCategory::NotFound => Self::not_found(err.to_string()),
            ErrorCategory::Unsupported => Self::new(FaultKind::UnsupportedType, err.to_string()),
            ErrorCategory::Validation | ErrorCategory::Internal => Self::store(err.to_string()),
        }
    }
}

/// Bundle-level failures.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// The bundle declares neither transaction nor batch.
    #[error("Bundle does not declare a mode (transaction or batch)")]
    MissingMode,

    /// The bundle declares a type other than transaction or batch.
    #[error("Unsupported bundle type: {0}")]
    UnsupportedBundleType(String),

    /// The bundle document itself is malformed.
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Processor configuration was rejected.
    #[error("Invalid processor configuration: {0}")]
    Config(String),

    /// A transaction entry failed validation; nothing was executed.
    #[error("Entry {index} is invalid: {fault}")]
    ValidationFailed { index: usize, fault: Fault },

    /// A transaction entry failed during execution; every change was compensated.
    #[error("Transaction failed at entry {index}: {fault}")]
    TransactionFailed {
        index: usize,
        fault: Fault,
        rollback: RollbackReport,
    },
}

impl BundleError {
    /// HTTP-like status the whole bundle is answered with.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::MissingMode
            | Self::UnsupportedBundleType(_)
            | Self::InvalidBundle(_)
            | Self::ValidationFailed { .. } => OutcomeStatus::BadRequest,
            Self::Config(_) => OutcomeStatus::InternalError,
            Self::TransactionFailed { fault, .. } => fault.status(),
        }
    }

    /// OperationOutcome `issue.code` for this error.
    pub fn issue_code(&self) -> &'static str {
        match self {
            Self::MissingMode | Self::InvalidBundle(_) => "invalid",
            Self::UnsupportedBundleType(_) => "not-supported",
            Self::Config(_) => "exception",
            Self::ValidationFailed { fault, .. } | Self::TransactionFailed { fault, .. } => {
                fault.kind.issue_code()
            }
        }
    }

    /// Index of the entry that caused the failure, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::ValidationFailed { index, .. } | Self::TransactionFailed { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}
