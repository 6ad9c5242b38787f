use serde::Serialize;
use serde_json::Value;

use crate::entry::{BundleEntry, BundleMode, OutcomeStatus};

/// Per-entry result, in the position of the request entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryResponse {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The stored representation for created, updated and read entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl EntryResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outcome of a processed bundle, one response per request entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleResponse {
    pub mode: BundleMode,
    pub entries: Vec<EntryResponse>,
}

impl BundleResponse {
    /// Builds the response from processed entries.
    ///
    /// An entry without an outcome was never reached; it is reported as an
    /// internal error rather than silently dropped.
    pub fn from_entries(mode: BundleMode, entries: Vec<BundleEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| match entry.outcome {
                Some(outcome) => {
                    let resource = match outcome.status {
                        OutcomeStatus::Created | OutcomeStatus::Updated | OutcomeStatus::ReadOk => {
                            entry.resource
                        }
                        _ => None,
                    };
                    EntryResponse {
                        status: outcome.status,
                        location: outcome.location,
                        message: outcome.message,
                        resource,
                    }
                }
                None => EntryResponse {
                    status: OutcomeStatus::InternalError,
                    location: None,
                    message: Some("entry was not processed".to_string()),
                    resource: None,
                },
            })
            .collect();
        Self { mode, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(EntryResponse::is_success)
    }
}
