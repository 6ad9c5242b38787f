use cdwfhir_bundle::ProcessorConfig;
use cdwfhir_core::validate_resource_type;
use cdwfhir_storage::ReferencePath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.processor
            .validate()
            .map_err(|e| format!("processor: {e}"))?;

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        if self.store.types.is_empty() {
            return Err("store.types must declare at least one resource type".into());
        }
        let mut seen = std::collections::HashSet::new();
        for declared in &self.store.types {
            let name = &declared.name;
            validate_resource_type(name).map_err(|e| format!("store.types.{name}: {e}"))?;
            if !seen.insert(name.as_str()) {
                return Err(format!("store.types.{name} is declared twice"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "warn".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resource types the warehouse serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub types: Vec<TypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConfig {
    pub name: String,
    /// Fields holding references that must be resolved before a write.
    #[serde(default)]
    pub reference_paths: Vec<ReferencePath>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let declare = |name: &str, paths: &[&str]| TypeConfig {
            name: name.to_string(),
            reference_paths: paths
                .iter()
                .filter_map(|p| ReferencePath::parse(p).ok())
                .collect(),
        };
        Self {
            types: vec![
                declare("Patient", &["generalPractitioner", "managingOrganization", "link.other"]),
                declare("Practitioner", &[]),
                declare("Organization", &["partOf"]),
                declare(
                    "Encounter",
                    &["subject", "participant.individual", "serviceProvider", "partOf"],
                ),
                declare("Observation", &["subject", "encounter", "performer", "hasMember"]),
                declare("Condition", &["subject", "encounter", "recorder", "asserter"]),
                declare("Procedure", &["subject", "encounter", "performer.actor"]),
                declare("MedicationRequest", &["subject", "encounter", "requester"]),
            ],
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(format!("config file not found: {}", p.display()));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from("cdwfhir.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., CDWFHIR__PROCESSOR__TIMEOUT_MS=5000
        builder = builder.add_source(
            Environment::with_prefix("CDWFHIR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn declared<'a>(config: &'a AppConfig, name: &str) -> Option<&'a TypeConfig> {
        config.store.types.iter().find(|t| t.name == name)
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(declared(&config, "Observation").is_some());
        assert_eq!(
            declared(&config, "Encounter").unwrap().reference_paths[1].to_string(),
            "participant.individual"
        );
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.types.push(TypeConfig {
            name: "observation".into(),
            reference_paths: Vec::new(),
        });
        assert!(config.validate().unwrap_err().contains("store.types.observation"));

        let mut config = AppConfig::default();
        let duplicate = config.store.types[0].clone();
        config.store.types.push(duplicate);
        assert!(config.validate().unwrap_err().contains("declared twice"));

        let mut config = AppConfig::default();
        config.processor.max_reference_depth = 0;
        assert!(config.validate().unwrap_err().starts_with("processor"));
    }

    #[test]
    fn loads_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[processor]
max_reference_depth = 4

[[store.types]]
name = "Patient"
reference_paths = ["generalPractitioner"]

[[store.types]]
name = "Observation"
reference_paths = ["subject"]
"#
        )
        .unwrap();

        let config = loader::load_config(Some(file.path())).unwrap();
        assert_eq!(config.processor.max_reference_depth, 4);
        assert_eq!(config.processor.timeout_ms, None);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.store.types.len(), 2);
        assert_eq!(
            declared(&config, "Observation").unwrap().reference_paths[0].to_string(),
            "subject"
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = loader::load_config(Some(std::path::Path::new("/nonexistent/cdwfhir.toml")))
            .unwrap_err();
        assert!(err.contains("not found"));
    }
}
