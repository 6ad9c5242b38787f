//! Resource Mapper Registry: an explicit, constructed lookup from resource
//! type name to the mapper that serves it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;
use crate::reference_path::ReferencePath;
use crate::traits::ResourceMapper;

/// Shared handle to a mapper.
pub type DynMapper = Arc<dyn ResourceMapper>;

/// Dispatches reads, writes and deletes to the mapper registered for a type.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, DynMapper>,
}

impl MapperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mapper under its own resource type, returning any mapper it replaced.
    pub fn register(&mut self, mapper: DynMapper) -> Option<DynMapper> {
        let resource_type = mapper.resource_type().to_string();
        debug!(resource_type = %resource_type, "Registering resource mapper");
        self.mappers.insert(resource_type, mapper)
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_mapper(mut self, mapper: DynMapper) -> Self {
        self.register(mapper);
        self
    }

    /// Returns whether a mapper is registered for `resource_type`.
    pub fn supports(&self, resource_type: &str) -> bool {
        self.mappers.contains_key(resource_type)
    }

    /// Returns the registered resource type names, sorted.
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.mappers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Looks up the mapper for `resource_type`.
    pub fn get(&self, resource_type: &str) -> Result<&DynMapper, StorageError> {
        self.mappers
            .get(resource_type)
            .ok_or_else(|| StorageError::unsupported_type(resource_type))
    }

    /// Reference fields declared for `resource_type` (empty when unsupported).
    pub fn reference_paths(&self, resource_type: &str) -> &[ReferencePath] {
        self.mappers
            .get(resource_type)
            .map(|m| m.reference_paths())
            .unwrap_or(&[])
    }

    pub async fn read(&self, resource_type: &str, id: &str) -> Result<Value, StorageError> {
        debug!(resource_type = %resource_type, id = %id, "mapper read");
        self.get(resource_type)?.read(id).await
    }

    pub async fn write(
        &self,
        resource_type: &str,
        resource: &Value,
        existing_id: Option<&str>,
    ) -> Result<String, StorageError> {
        debug!(resource_type = %resource_type, id = ?existing_id, "mapper write");
        self.get(resource_type)?.write(resource, existing_id).await
    }

    pub async fn delete(&self, resource_type: &str, id: &str) -> Result<String, StorageError> {
        debug!(resource_type = %resource_type, id = %id, "mapper delete");
        self.get(resource_type)?.delete(id).await
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedMapper {
        paths: Vec<ReferencePath>,
    }

    #[async_trait]
    impl ResourceMapper for FixedMapper {
        fn resource_type(&self) -> &str {
            "Observation"
        }

        fn reference_paths(&self) -> &[ReferencePath] {
            &self.paths
        }

        async fn read(&self, id: &str) -> Result<Value, StorageError> {
            if id == "1" {
                Ok(json!({"resourceType": "Observation", "id": "1"}))
            } else {
                Err(StorageError::not_found("Observation", id))
            }
        }

        async fn write(
            &self,
            _resource: &Value,
            existing_id: Option<&str>,
        ) -> Result<String, StorageError> {
            Ok(existing_id.unwrap_or("2").to_string())
        }

        async fn delete(&self, id: &str) -> Result<String, StorageError> {
            Ok(id.to_string())
        }
    }

    fn registry() -> MapperRegistry {
        MapperRegistry::new().with_mapper(Arc::new(FixedMapper {
            paths: vec![ReferencePath::parse("subject").unwrap()],
        }))
    }

    #[tokio::test]
    async fn dispatches_to_registered_mapper() {
        let registry = registry();
        assert!(registry.supports("Observation"));
        assert!(!registry.supports("Patient"));
        assert_eq!(registry.resource_types(), vec!["Observation"]);

        let read = registry.read("Observation", "1").await.unwrap();
        assert_eq!(read["id"], json!("1"));
        assert!(registry.read("Observation", "9").await.unwrap_err().is_not_found());
        assert_eq!(
            registry
                .write("Observation", &json!({}), None)
                .await
                .unwrap(),
            "2"
        );
        assert_eq!(registry.delete("Observation", "5").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn unsupported_types_are_reported() {
        let registry = registry();
        let err = registry.read("Patient", "1").await.unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(registry.reference_paths("Patient").is_empty());
        assert_eq!(registry.reference_paths("Observation").len(), 1);
    }
}
