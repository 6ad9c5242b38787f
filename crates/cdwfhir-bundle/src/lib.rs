//! # cdwfhir-bundle
//!
//! Transaction and batch bundle processing for the clinical data warehouse.
//!
//! A bundle is an ordered list of create/update/delete/read entries. The
//! processor partitions the entries into operation groups, runs the groups
//! in a fixed order (deletes, creates, updates, reads), rewrites bundle-local
//! references to stable `Type/id` references before each write, and either
//! commits or compensates the whole bundle (transaction) or reports each
//! entry on its own (batch).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cdwfhir_bundle::{Bundle, BundleEntry, BundleProcessor};
//! use serde_json::json;
//!
//! let processor = BundleProcessor::new(Arc::new(registry));
//! let response = processor
//!     .process(Bundle::transaction(vec![
//!         BundleEntry::create(json!({"resourceType": "Patient"})).with_full_url("urn:uuid:p1"),
//!         BundleEntry::create(json!({
//!             "resourceType": "Observation",
//!             "subject": {"reference": "urn:uuid:p1"}
//!         })),
//!     ]))
//!     .await?;
//! ```

mod classifier;
mod compensation;
mod config;
mod coordinator;
mod entry;
mod error;
mod executor;
mod resolver;
mod response;
mod wire;

pub use classifier::{EntryPlan, ExecutionPlan, classify, classify_entry, operation_of};
pub use compensation::{CompensationLog, RollbackReport, Snapshot, TransactionState};
pub use config::ProcessorConfig;
pub use coordinator::BundleProcessor;
pub use entry::{Bundle, BundleEntry, BundleMode, EntryOutcome, Operation, OutcomeStatus, Verb};
pub use error::{BundleError, Fault, FaultKind};
pub use resolver::ResolvedReferenceCache;
pub use response::{BundleResponse, EntryResponse};
pub use wire::operation_outcome;
