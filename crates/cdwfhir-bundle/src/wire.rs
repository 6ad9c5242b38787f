//! FHIR JSON codec for request bundles, response bundles and
//! OperationOutcome error documents.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::entry::{Bundle, BundleEntry, BundleMode, OutcomeStatus, Verb};
use crate::error::BundleError;
use crate::response::{BundleResponse, EntryResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleDocument {
    resource_type: Option<String>,
    #[serde(rename = "type")]
    bundle_type: Option<String>,
    #[serde(default)]
    entry: Vec<EntryDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryDocument {
    full_url: Option<String>,
    resource: Option<Value>,
    request: Option<RequestDocument>,
}

#[derive(Debug, Deserialize)]
struct RequestDocument {
    method: Option<String>,
    url: Option<String>,
}

impl Bundle {
    /// Parses a FHIR `Bundle` of type `transaction` or `batch`.
    ///
    /// A missing `type` yields a bundle without a mode, which
    /// [`BundleProcessor::process`](crate::BundleProcessor::process) rejects.
    pub fn from_json(document: &Value) -> Result<Self, BundleError> {
        let parsed = BundleDocument::deserialize(document)
            .map_err(|e| BundleError::InvalidBundle(e.to_string()))?;

        if let Some(resource_type) = parsed.resource_type.as_deref() {
            if resource_type != "Bundle" {
                return Err(BundleError::InvalidBundle(format!(
                    "expected resourceType 'Bundle', got '{resource_type}'"
                )));
            }
        }

        let mode = match parsed.bundle_type.as_deref() {
            None => None,
            Some(bundle_type) => Some(
                bundle_type
                    .parse::<BundleMode>()
                    .map_err(|_| BundleError::UnsupportedBundleType(bundle_type.to_string()))?,
            ),
        };

        let entries = parsed
            .entry
            .into_iter()
            .map(|entry| {
                let (method, url) = match entry.request {
                    Some(request) => (request.method, request.url),
                    None => (None, None),
                };
                BundleEntry {
                    full_url: entry.full_url.filter(|u| !u.is_empty()),
                    resource: entry.resource,
                    verb: Verb::from_method(method.as_deref()),
                    request_url: url.filter(|u| !u.is_empty()),
                    outcome: None,
                }
            })
            .collect();

        Ok(Bundle::new(mode, entries))
    }
}

impl BundleResponse {
    /// Renders a `transaction-response` or `batch-response` Bundle.
    pub fn to_json(&self) -> Value {
        let bundle_type = match self.mode {
            BundleMode::Transaction => "transaction-response",
            BundleMode::Batch => "batch-response",
        };
        let entries: Vec<Value> = self.entries.iter().map(entry_to_json).collect();
        json!({
            "resourceType": "Bundle",
            "type": bundle_type,
            "entry": entries,
        })
    }
}

fn entry_to_json(entry: &EntryResponse) -> Value {
    let mut response = json!({ "status": entry.status.status_line() });
    if let Some(location) = &entry.location {
        response["location"] = Value::String(location.clone());
    }
    if let Some(message) = &entry.message {
        response["outcome"] = operation_outcome(
            severity_of(entry.status),
            issue_code_of(entry.status),
            message,
        );
    }

    let mut rendered = json!({ "response": response });
    if let Some(resource) = &entry.resource {
        rendered["resource"] = resource.clone();
    }
    rendered
}

fn severity_of(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::InternalError => "fatal",
        s if s.is_success() => "information",
        _ => "error",
    }
}

fn issue_code_of(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::NotFound => "not-found",
        OutcomeStatus::BadRequest => "invalid",
        OutcomeStatus::NotImplemented => "not-supported",
        OutcomeStatus::InternalError => "exception",
        _ => "informational",
    }
}

/// Builds a single-issue OperationOutcome.
pub fn operation_outcome(severity: &str, code: &str, diagnostics: &str) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [
            {
                "severity": severity,
                "code": code,
                "diagnostics": diagnostics,
            }
        ]
    })
}

impl BundleError {
    /// Renders the error as an OperationOutcome.
    ///
    /// Entry-level failures point at the offending entry through
    /// `issue.expression` (`Bundle.entry[i]`).
    pub fn to_operation_outcome(&self) -> Value {
        let severity = match self.status() {
            OutcomeStatus::InternalError => "fatal",
            _ => "error",
        };
        let mut outcome = operation_outcome(severity, self.issue_code(), &self.to_string());
        if let Some(index) = self.entry_index() {
            outcome["issue"][0]["expression"] = json!([format!("Bundle.entry[{index}]")]);
        }
        if let BundleError::TransactionFailed { rollback, .. } = self {
            if !rollback.is_complete() {
                if let Some(issues) = outcome["issue"].as_array_mut() {
                    for failure in &rollback.failures {
                        issues.push(json!({
                            "severity": "warning",
                            "code": "incomplete",
                            "diagnostics": format!("rollback step failed: {failure}"),
                        }));
                    }
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::RollbackReport;
    use crate::entry::EntryOutcome;
    use crate::error::Fault;

    #[test]
    fn parses_transaction_bundle() {
        let document = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:p1",
                    "resource": {"resourceType": "Patient"},
                    "request": {"method": "POST", "url": "Patient"}
                },
                {
                    "request": {"method": "delete", "url": "Observation/4"}
                },
                {
                    "resource": {"resourceType": "Observation"}
                }
            ]
        });
        let bundle = Bundle::from_json(&document).unwrap();

        assert_eq!(bundle.mode, Some(BundleMode::Transaction));
        assert_eq!(bundle.entries.len(), 3);
        assert_eq!(bundle.entries[0].full_url.as_deref(), Some("urn:uuid:p1"));
        assert_eq!(bundle.entries[0].verb, Verb::Create);
        assert_eq!(bundle.entries[1].verb, Verb::Delete);
        assert_eq!(bundle.entries[1].request_url.as_deref(), Some("Observation/4"));
        assert_eq!(bundle.entries[2].verb, Verb::Unspecified);
    }

    #[test]
    fn bundle_type_and_shape_errors() {
        let bundle = Bundle::from_json(&json!({"resourceType": "Bundle"})).unwrap();
        assert_eq!(bundle.mode, None);
        assert!(bundle.entries.is_empty());

        let err = Bundle::from_json(&json!({"resourceType": "Bundle", "type": "collection"}))
            .unwrap_err();
        assert!(matches!(err, BundleError::UnsupportedBundleType(t) if t == "collection"));

        let err = Bundle::from_json(&json!({"resourceType": "Patient"})).unwrap_err();
        assert!(matches!(err, BundleError::InvalidBundle(_)));

        let err = Bundle::from_json(&json!({"type": "batch", "entry": {"not": "a list"}}))
            .unwrap_err();
        assert!(matches!(err, BundleError::InvalidBundle(_)));
    }

    #[test]
    fn renders_response_bundle() {
        let mut created = BundleEntry::create(json!({"resourceType": "Patient", "id": "1"}));
        created.outcome = Some(EntryOutcome::success(
            OutcomeStatus::Created,
            Some("Patient/1".into()),
        ));
        let mut missing = BundleEntry::read("Patient/9");
        missing.outcome = Some(EntryOutcome::failure(
            OutcomeStatus::NotFound,
            "Patient/9 does not exist",
        ));
        let response = BundleResponse::from_entries(BundleMode::Batch, vec![created, missing]);
        let rendered = response.to_json();

        assert_eq!(rendered["type"], json!("batch-response"));
        assert_eq!(rendered["entry"][0]["response"]["status"], json!("201 Created"));
        assert_eq!(rendered["entry"][0]["response"]["location"], json!("Patient/1"));
        assert_eq!(rendered["entry"][0]["resource"]["id"], json!("1"));
        assert_eq!(rendered["entry"][1]["response"]["status"], json!("404 Not Found"));
        assert_eq!(
            rendered["entry"][1]["response"]["outcome"]["issue"][0]["code"],
            json!("not-found")
        );
        assert!(rendered["entry"][1].get("resource").is_none());
    }

    #[test]
    fn renders_bundle_errors_as_operation_outcomes() {
        let err = BundleError::TransactionFailed {
            index: 3,
            fault: Fault::store("disk full"),
            rollback: RollbackReport {
                deleted: 1,
                restored: 0,
                failures: vec!["restore Patient/2: Internal error: gone".into()],
            },
        };
        let outcome = err.to_operation_outcome();

        assert_eq!(outcome["resourceType"], json!("OperationOutcome"));
        assert_eq!(outcome["issue"][0]["severity"], json!("fatal"));
        assert_eq!(outcome["issue"][0]["code"], json!("exception"));
        assert_eq!(outcome["issue"][0]["expression"][0], json!("Bundle.entry[3]"));
        assert_eq!(outcome["issue"][1]["code"], json!("incomplete"));

        let outcome = BundleError::MissingMode.to_operation_outcome();
        assert_eq!(outcome["issue"][0]["code"], json!("invalid"));
        assert!(outcome["issue"][0].get("expression").is_none());
    }
}
