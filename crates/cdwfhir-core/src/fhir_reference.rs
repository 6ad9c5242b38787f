//! FHIR reference and request URL parsing.
//!
//! Bundle entries point at each other and at stored resources through three
//! kinds of strings:
//! - Stable references: `Patient/123`, optionally absolute
//!   (`http://example.org/fhir/Patient/123`) or versioned
//!   (`Patient/123/_history/2`)
//! - Temporary ids: `urn:uuid:xxx` / `urn:oid:xxx`, only meaningful inside one bundle
//! - Request URLs: `entry.request.url`, which for delete/read/update must name
//!   a resource type and a numeric id
//!
//! # Example
//!
//! ```
//! use cdwfhir_core::fhir_reference::{parse_reference, parse_request_url};
//!
//! let r = parse_reference("Patient/123", None).unwrap();
//! assert_eq!(r.resource_type, "Patient");
//! assert_eq!(r.id, "123");
//!
//! let target = parse_request_url("Observation/7?_format=json", None).unwrap();
//! assert_eq!(target.to_relative(), "Observation/7");
//! ```

use std::fmt;

use crate::error::{CoreError, Result};
use crate::id::{parse_numeric_id, validate_resource_type};

/// A successfully parsed FHIR reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    /// The resource type (e.g., "Patient", "Observation")
    pub resource_type: String,
    /// The resource ID
    pub id: String,
    /// Optional version ID from `_history` suffix
    pub version: Option<String>,
}

impl FhirReference {
    /// Creates a new FhirReference.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Returns the reference as a relative string (Type/id).
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for FhirReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_relative())
    }
}

/// Represents a reference that cannot be resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReference {
    /// A contained reference (starts with `#`)
    Contained(String),
    /// A URN reference (`urn:uuid:xxx` or `urn:oid:xxx`)
    Urn(String),
    /// An external server reference (different base URL)
    External(String),
    /// A malformed or invalid reference
    Invalid(String),
}

impl fmt::Display for UnresolvableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contained(id) => write!(f, "contained reference: #{id}"),
            Self::Urn(urn) => write!(f, "URN reference: {urn}"),
            Self::External(url) => write!(f, "external reference: {url}"),
            Self::Invalid(reason) => write!(f, "invalid reference: {reason}"),
        }
    }
}

impl std::error::Error for UnresolvableReference {}

/// Returns `true` for bundle-local placeholder ids (`urn:uuid:` / `urn:oid:`).
pub fn is_temporary_id(reference: &str) -> bool {
    let reference = reference.trim();
    reference.starts_with("urn:uuid:") || reference.starts_with("urn:oid:")
}

/// Strips the configured base URL (if any) and leading slashes from a path.
///
/// Returns `None` for absolute URLs that point at another server.
fn local_path<'a>(reference: &'a str, base_url: Option<&str>) -> Option<&'a str> {
    if reference.contains("://") {
        let base = base_url?.trim_end_matches('/');
        let suffix = reference.strip_prefix(base)?;
        Some(suffix.trim_start_matches('/'))
    } else {
        Some(reference.trim_start_matches('/'))
    }
}

/// Parse a FHIR reference string into its components.
///
/// # Arguments
///
/// * `reference` - The reference string to parse
/// * `base_url` - Optional base URL of the warehouse. Absolute URLs matching
///   this base are treated as local references.
pub fn parse_reference(
    reference: &str,
    base_url: Option<&str>,
) -> std::result::Result<FhirReference, UnresolvableReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "empty reference".to_string(),
        ));
    }

    if let Some(contained_id) = reference.strip_prefix('#') {
        return Err(UnresolvableReference::Contained(contained_id.to_string()));
    }

    if reference.starts_with("urn:") {
        return Err(UnresolvableReference::Urn(reference.to_string()));
    }

    let Some(path) = local_path(reference, base_url) else {
        return Err(UnresolvableReference::External(reference.to_string()));
    };

    // "ResourceType/id" or "ResourceType/id/_history/version"
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 2 {
        return Err(UnresolvableReference::Invalid(format!(
            "reference must contain at least Type/id: {reference}"
        )));
    }

    let resource_type = parts[0];
    let id = parts[1];

    if validate_resource_type(resource_type).is_err() {
        return Err(UnresolvableReference::Invalid(format!(
            "resource type must start with uppercase letter: {resource_type}"
        )));
    }

    if id.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "resource id cannot be empty".to_string(),
        ));
    }

    let version = if parts.len() >= 4 && parts[2] == "_history" {
        Some(parts[3].to_string())
    } else {
        None
    };

    Ok(FhirReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

/// Parse the target of a delete/read/update request URL.
///
/// Accepts `Type/<numeric id>`, optionally prefixed with `/` or `base_url`,
/// optionally followed by `/_history/<v>` and a query string (both ignored).
pub fn parse_request_url(url: &str, base_url: Option<&str>) -> Result<FhirReference> {
    let without_query = url.trim().split('?').next().unwrap_or_default();
    let path = local_path(without_query, base_url)
        .ok_or_else(|| CoreError::invalid_request_url(format!("external url: {url}")))?;

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let (resource_type, id) = match parts.as_slice() {
        [resource_type, id] | [resource_type, id, "_history", _] => (*resource_type, *id),
        _ => {
            return Err(CoreError::invalid_request_url(format!(
                "expected Type/id, got '{url}'"
            )));
        }
    };

    validate_resource_type(resource_type)?;
    parse_numeric_id(id)?;

    Ok(FhirReference::new(resource_type, id))
}

/// Validate and normalise a configured base URL (no trailing slash).
pub fn normalize_base_url(base_url: &str) -> Result<String> {
    let parsed = url::Url::parse(base_url)?;
    if parsed.cannot_be_a_base() {
        return Err(CoreError::invalid_request_url(format!(
            "base url cannot be a base: {base_url}"
        )));
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

/// Extract the resource type named by a request URL (`Patient`, `Patient/1`,
/// `Patient?identifier=x`).
pub fn request_url_type(url: &str, base_url: Option<&str>) -> Option<String> {
    let without_query = url.trim().split('?').next()?;
    let path = local_path(without_query, base_url)?;
    let resource_type = path.split('/').next()?;
    validate_resource_type(resource_type).ok()?;
    Some(resource_type.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_relative_reference() {
        let r = parse_reference("Patient/123", None).unwrap();
        assert_eq!(r.resource_type, "Patient");
        assert_eq!(r.id, "123");
        assert_eq!(r.version, None);
    }

    #[test]
    fn test_versioned_reference() {
        let r = parse_reference("Patient/123/_history/2", None).unwrap();
        assert_eq!(r.id, "123");
        assert_eq!(r.version, Some("2".to_string()));
    }

    #[test]
    fn test_absolute_url_with_matching_base() {
        let r = parse_reference(
            "http://localhost:8888/fhir/Patient/123",
            Some("http://localhost:8888/fhir/"),
        )
        .unwrap();
        assert_eq!(r.to_relative(), "Patient/123");
    }

    #[test]
    fn test_external_absolute_url() {
        let result = parse_reference(
            "http://other-server.com/fhir/Patient/123",
            Some("http://localhost:8888/fhir"),
        );
        assert!(matches!(result, Err(UnresolvableReference::External(_))));
        let result = parse_reference("http://localhost:8888/fhir/Patient/123", None);
        assert!(matches!(result, Err(UnresolvableReference::External(_))));
    }

    #[test]
    fn test_urn_and_contained_references() {
        assert!(matches!(
            parse_reference("urn:uuid:550e8400-e29b-41d4-a716-446655440000", None),
            Err(UnresolvableReference::Urn(_))
        ));
        assert!(matches!(
            parse_reference("#contained-id", None),
            Err(UnresolvableReference::Contained(id)) if id == "contained-id"
        ));
    }

    #[test]
    fn test_invalid_references() {
        assert!(matches!(
            parse_reference("patient/123", None),
            Err(UnresolvableReference::Invalid(_))
        ));
        assert!(matches!(
            parse_reference("Patient/", None),
            Err(UnresolvableReference::Invalid(_))
        ));
        assert!(matches!(
            parse_reference("  ", None),
            Err(UnresolvableReference::Invalid(_))
        ));
    }

    #[test]
    fn test_temporary_ids() {
        assert!(is_temporary_id("urn:uuid:abc"));
        assert!(is_temporary_id("urn:oid:1.2.3"));
        assert!(!is_temporary_id("Patient/1"));
        assert!(!is_temporary_id("t1"));
    }

    #[test]
    fn test_request_url_variants() {
        assert_eq!(
            parse_request_url("Patient/12", None).unwrap().to_relative(),
            "Patient/12"
        );
        assert_eq!(
            parse_request_url("/Patient/12?_pretty=true", None)
                .unwrap()
                .to_relative(),
            "Patient/12"
        );
        assert_eq!(
            parse_request_url("Patient/12/_history/3", None)
                .unwrap()
                .to_relative(),
            "Patient/12"
        );
        assert_eq!(
            parse_request_url("http://cdw.local/fhir/Patient/12", Some("http://cdw.local/fhir"))
                .unwrap()
                .to_relative(),
            "Patient/12"
        );
    }

    #[test]
    fn test_request_url_rejects_bad_shapes() {
        assert!(parse_request_url("Patient", None).is_err());
        assert!(parse_request_url("Patient/abc", None).is_err());
        assert!(parse_request_url("patient/12", None).is_err());
        assert!(parse_request_url("Patient/12/extra", None).is_err());
        assert!(parse_request_url("http://elsewhere/Patient/12", None).is_err());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://cdw.local/fhir/").unwrap(),
            "http://cdw.local/fhir"
        );
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(CoreError::UrlError(_))
        ));
        assert!(normalize_base_url("mailto:someone@example.org").is_err());
    }

    #[test]
    fn test_request_url_type() {
        assert_eq!(request_url_type("Patient", None).as_deref(), Some("Patient"));
        assert_eq!(
            request_url_type("Observation?code=123", None).as_deref(),
            Some("Observation")
        );
        assert_eq!(request_url_type("/Patient/5", None).as_deref(), Some("Patient"));
        assert_eq!(request_url_type("", None), None);
        assert_eq!(request_url_type("lowercase/5", None), None);
    }
}
