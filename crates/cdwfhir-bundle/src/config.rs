use std::time::Duration;

use cdwfhir_core::normalize_base_url;
use serde::{Deserialize, Serialize};

/// Tuning knobs for [`BundleProcessor`](crate::BundleProcessor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum nesting of on-demand entry execution while resolving references.
    pub max_reference_depth: usize,
    /// Deadline for a whole bundle, in milliseconds. `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Public base URL of the warehouse; request URLs and references that
    /// start with it are treated as local.
    pub base_url: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_reference_depth: 32,
            timeout_ms: None,
            base_url: None,
        }
    }
}

impl ProcessorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_reference_depth == 0 {
            return Err("max_reference_depth must be greater than 0".into());
        }
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be greater than 0 when set".into());
        }
        if let Some(base_url) = &self.base_url {
            normalize_base_url(base_url).map_err(|e| format!("base_url: {e}"))?;
        }
        Ok(())
    }

    /// Validates and returns the config with `base_url` normalized.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.validate()?;
        if let Some(base_url) = &self.base_url {
            self.base_url = Some(normalize_base_url(base_url).map_err(|e| e.to_string())?);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_reference_depth, 32);
        assert_eq!(config.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: ProcessorConfig = toml::from_str("timeout_ms = 250").unwrap();
        assert_eq!(config.max_reference_depth, 32);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_bad_values() {
        let config = ProcessorConfig {
            max_reference_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProcessorConfig {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProcessorConfig {
            base_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalizes_base_url() {
        let config = ProcessorConfig {
            base_url: Some("http://cdw.example.org/fhir/".into()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://cdw.example.org/fhir"));
    }
}
