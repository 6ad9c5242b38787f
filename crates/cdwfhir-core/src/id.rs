//! Resource type and identifier validation.
//!
//! Warehouse rows are keyed by numeric surrogate ids, so every id that comes
//! from a request URL must parse as an unsigned integer.

use crate::error::{CoreError, Result};

/// Parse a stable numeric id.
pub fn parse_numeric_id(id: &str) -> Result<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid_id(id));
    }
    id.parse::<u64>().map_err(|_| CoreError::invalid_id(id))
}

/// Resource type names start with an ASCII uppercase letter and are alphanumeric.
pub fn validate_resource_type(resource_type: &str) -> Result<()> {
    let mut chars = resource_type.chars();
    let starts_upper = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    if !starts_upper || !chars.all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::invalid_resource_type(resource_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids() {
        assert_eq!(parse_numeric_id("42").unwrap(), 42);
        assert!(parse_numeric_id("").is_err());
        assert!(parse_numeric_id("-1").is_err());
        assert!(parse_numeric_id("4a").is_err());
        assert!(parse_numeric_id("99999999999999999999999").is_err());
    }

    #[test]
    fn resource_types() {
        assert!(validate_resource_type("Patient").is_ok());
        assert!(validate_resource_type("MedicationRequest").is_ok());
        assert!(validate_resource_type("patient").is_err());
        assert!(validate_resource_type("Pat-ient").is_err());
        assert!(validate_resource_type("").is_err());
    }
}
