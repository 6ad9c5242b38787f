pub mod error;
pub mod fhir_reference;
pub mod id;

pub use error::{CoreError, Result};
pub use fhir_reference::{
    FhirReference, UnresolvableReference, is_temporary_id, normalize_base_url, parse_reference,
    parse_request_url, request_url_type,
};
pub use id::{parse_numeric_id, validate_resource_type};
