//! Bundle data model: mode, entries, verbs and per-entry outcomes.

use std::fmt;
use std::str::FromStr;

use cdwfhir_core::request_url_type;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Consistency contract for a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleMode {
    /// All entries succeed or every change is compensated.
    Transaction,
    /// Every entry stands on its own.
    Batch,
}

impl BundleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Batch => "batch",
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction)
    }
}

impl fmt::Display for BundleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction" => Ok(Self::Transaction),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown bundle mode '{other}'")),
        }
    }
}

/// The verb an entry asked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    Delete,
    Create,
    Update,
    Read,
    /// No method was given.
    Unspecified,
    /// A method the processor does not implement (e.g. `PATCH`).
    Unsupported(String),
}

impl Verb {
    /// Maps an HTTP method (case-insensitive) onto a verb.
    pub fn from_method(method: Option<&str>) -> Self {
        let Some(method) = method.map(str::trim).filter(|m| !m.is_empty()) else {
            return Self::Unspecified;
        };
        match method.to_ascii_uppercase().as_str() {
            "DELETE" => Self::Delete,
            "POST" => Self::Create,
            "PUT" => Self::Update,
            "GET" => Self::Read,
            _ => Self::Unsupported(method.to_string()),
        }
    }

    /// The HTTP method this verb is written as on the wire, if any.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Delete => Some("DELETE"),
            Self::Create => Some("POST"),
            Self::Update => Some("PUT"),
            Self::Read => Some("GET"),
            Self::Unspecified => None,
            Self::Unsupported(method) => Some(method),
        }
    }
}

/// The four executable operation groups, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Delete,
    Create,
    Update,
    Read,
}

impl Operation {
    /// Deletes free identifier slots before creates; reads see the final state.
    pub const EXECUTION_ORDER: [Operation; 4] = [
        Operation::Delete,
        Operation::Create,
        Operation::Update,
        Operation::Read,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Create => "create",
            Self::Update => "update",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status category of a processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Created,
    Updated,
    Deleted,
    ReadOk,
    NotFound,
    BadRequest,
    NotImplemented,
    InternalError,
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Updated | Self::Deleted | Self::ReadOk
        )
    }

    pub fn http_code(&self) -> u16 {
        match self {
            Self::Created => 201,
            Self::Updated | Self::ReadOk => 200,
            Self::Deleted => 204,
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::NotImplemented => 501,
            Self::InternalError => 500,
        }
    }

    /// HTTP status line as written into `entry.response.status`.
    pub fn status_line(&self) -> &'static str {
        match self {
            Self::Created => "201 Created",
            Self::Updated | Self::ReadOk => "200 OK",
            Self::Deleted => "204 No Content",
            Self::NotFound => "404 Not Found",
            Self::BadRequest => "400 Bad Request",
            Self::NotImplemented => "501 Not Implemented",
            Self::InternalError => "500 Internal Server Error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_line())
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub status: OutcomeStatus,
    /// `Type/id` of the affected resource for created/updated entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Diagnostic detail for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EntryOutcome {
    pub fn success(status: OutcomeStatus, location: Option<String>) -> Self {
        Self {
            status,
            location,
            message: None,
        }
    }

    pub fn failure(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One operation inside a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleEntry {
    /// Bundle-local id other entries may reference (`entry.fullUrl`).
    pub full_url: Option<String>,
    pub resource: Option<Value>,
    pub verb: Verb,
    /// `entry.request.url`: type and id for delete/read/update without a resource.
    pub request_url: Option<String>,
    /// Filled in by the processor.
    pub outcome: Option<EntryOutcome>,
}

impl BundleEntry {
    pub fn new(verb: Verb) -> Self {
        Self {
            full_url: None,
            resource: None,
            verb,
            request_url: None,
            outcome: None,
        }
    }

    /// A create (`POST`) of `resource`.
    pub fn create(resource: Value) -> Self {
        Self::new(Verb::Create).with_resource(resource)
    }

    /// An update (`PUT`) of `resource`, targeting the resource's own id.
    pub fn update(resource: Value) -> Self {
        Self::new(Verb::Update).with_resource(resource)
    }

    /// A delete of the resource named by `url` (`Type/id`).
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Verb::Delete).with_request_url(url)
    }

    /// A read of the resource named by `url` (`Type/id`).
    pub fn read(url: impl Into<String>) -> Self {
        Self::new(Verb::Read).with_request_url(url)
    }

    #[must_use]
    pub fn with_full_url(mut self, full_url: impl Into<String>) -> Self {
        self.full_url = Some(full_url.into());
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    #[must_use]
    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }

    /// `resourceType` of the inline resource, if any.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
    }

    /// `id` of the inline resource, if any.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The type this entry operates on: the inline resource's type, else the
    /// type named by the request URL.
    pub fn declared_type(&self, base_url: Option<&str>) -> Option<String> {
        self.resource_type().map(str::to_string).or_else(|| {
            self.request_url
                .as_deref()
                .and_then(|url| request_url_type(url, base_url))
        })
    }
}

/// An ordered list of entries plus the mode they must be executed under.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bundle {
    /// Required; a bundle without a mode is rejected before any entry runs.
    pub mode: Option<BundleMode>,
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    pub fn new(mode: Option<BundleMode>, entries: Vec<BundleEntry>) -> Self {
        Self { mode, entries }
    }

    pub fn transaction(entries: Vec<BundleEntry>) -> Self {
        Self::new(Some(BundleMode::Transaction), entries)
    }

    pub fn batch(entries: Vec<BundleEntry>) -> Self {
        Self::new(Some(BundleMode::Batch), entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verbs_from_http_methods() {
        assert_eq!(Verb::from_method(Some("delete")), Verb::Delete);
        assert_eq!(Verb::from_method(Some("POST")), Verb::Create);
        assert_eq!(Verb::from_method(Some("Put")), Verb::Update);
        assert_eq!(Verb::from_method(Some("GET")), Verb::Read);
        assert_eq!(Verb::from_method(None), Verb::Unspecified);
        assert_eq!(Verb::from_method(Some("  ")), Verb::Unspecified);
        assert_eq!(
            Verb::from_method(Some("PATCH")),
            Verb::Unsupported("PATCH".to_string())
        );
        assert_eq!(Verb::Unsupported("PATCH".into()).method(), Some("PATCH"));
    }

    #[test]
    fn status_lines_and_success() {
        assert_eq!(OutcomeStatus::Created.status_line(), "201 Created");
        assert_eq!(OutcomeStatus::Deleted.http_code(), 204);
        assert!(OutcomeStatus::ReadOk.is_success());
        assert!(!OutcomeStatus::NotImplemented.is_success());
        assert_eq!(
            serde_json::to_value(OutcomeStatus::InternalError).unwrap(),
            json!("internal-error")
        );
    }

    #[test]
    fn declared_type_prefers_resource() {
        let entry = BundleEntry::update(json!({"resourceType": "Patient", "id": "4"}))
            .with_request_url("Observation/4");
        assert_eq!(entry.declared_type(None).as_deref(), Some("Patient"));
        assert_eq!(entry.resource_id(), Some("4"));

        let entry = BundleEntry::delete("Observation/9");
        assert_eq!(entry.declared_type(None).as_deref(), Some("Observation"));
        assert_eq!(entry.resource_id(), None);

        let entry = BundleEntry::new(Verb::Unspecified);
        assert_eq!(entry.declared_type(None), None);
    }

    #[test]
    fn bundle_modes_parse() {
        assert_eq!("batch".parse::<BundleMode>().unwrap(), BundleMode::Batch);
        assert!("collection".parse::<BundleMode>().is_err());
        assert!(BundleMode::Transaction.is_transaction());
        assert_eq!(Operation::EXECUTION_ORDER[0], Operation::Delete);
    }
}
